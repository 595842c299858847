// Integration tests harness
mod scenarios {
    include!("scenarios.rs");
}
mod degraded {
    include!("degraded.rs");
}
