//! End-to-end tests of the notary server live in `tests/`.
