//! The HitSpool interface: a distributed request-lifecycle coordinator
//! spread across three processes (`publisher`, `worker`, `sender`) and the
//! shared `hsiface-*` crates they're built from. This crate has no code of
//! its own — it exists so the workspace has a root package the integration
//! tests in `tests/integration/` can hang off, tying the three services'
//! end-to-end behavior together in one suite.
