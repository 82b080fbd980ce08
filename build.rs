use std::env;

pub fn main() {
    // Embedded migrations are compiled in; rebuild when they change
    println!("cargo:rerun-if-changed=migrations");

    // Configure static linking for musl targets (used by cross for static builds)
    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("musl") {
        configure_musl_static_linking();
    }
}

/// Configure static linking for musl targets
///
/// For musl targets, we build libpq from source (bundled mode) to get all the necessary
/// static libraries including libpgcommon.a and libpgport.a which aren't available in
/// system packages. This is enabled via the bundled-postgres feature.
fn configure_musl_static_linking() {
    println!("cargo:warning=Configuring bundled PostgreSQL build for musl static linking");

    #[cfg(not(feature = "bundled-postgres"))]
    {
        println!("cargo:warning=bundled-postgres feature not enabled - build may fail!");
        println!("cargo:warning=Use: cargo build --features bundled-postgres");
    }
}
