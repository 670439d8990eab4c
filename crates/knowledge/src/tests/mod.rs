//! Cross-module scenarios.
