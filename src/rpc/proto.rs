//! Generated from `proto/aggr.proto` by `tonic-prost-build` at build time
//! (server-only: see `build.rs`).

tonic::include_proto!("aggr.v1");
