//! Segment layer tests

mod record_tests;
