use std::env;

fn main() {
    println!("cargo:rerun-if-changed=csrc/va_shim.c");

    // The pure-Rust variadic exports replace the C trampolines.
    if env::var_os("CARGO_FEATURE_VARIADIC").is_some() {
        return;
    }

    cc::Build::new()
        .file("csrc/va_shim.c")
        .warnings(true)
        .compile("pg_elog_va");
}
