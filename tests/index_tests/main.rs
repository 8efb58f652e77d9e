//! Index layer tests
