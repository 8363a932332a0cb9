//! End-to-end tests driving whole frames through the recording backend

mod frame_integration;
