//! Multi-participant scenarios over the in-process broker.
