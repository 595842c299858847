// Property-based tests harness
mod strategies;
mod suspend {
    include!("suspend.rs");
}
mod weaving {
    include!("weaving.rs");
}
