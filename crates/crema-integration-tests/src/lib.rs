//! Cross-crate scenarios for Crema. Everything lives under `tests/`.
