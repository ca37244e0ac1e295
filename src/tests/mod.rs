//! Crate-level test suite: aligner properties and end-to-end client behaviour
//! against an in-process HTTP server.

mod client_tests;
