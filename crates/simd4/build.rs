//! Selects the lane backend for the target being compiled.
//!
//! `simd4_sse2` is set for `x86_64` targets with SSE2 enabled. Setting
//! `SIMD4_FORCE_SCALAR` at build time keeps the array backend everywhere.

fn main() {
    println!("cargo:rustc-check-cfg=cfg(simd4_sse2)");
    println!("cargo:rerun-if-env-changed=SIMD4_FORCE_SCALAR");

    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let features = std::env::var("CARGO_CFG_TARGET_FEATURE").unwrap_or_default();
    let has_sse2 = arch == "x86_64" && features.split(',').any(|f| f == "sse2");
    let force_scalar = std::env::var_os("SIMD4_FORCE_SCALAR").is_some();

    if has_sse2 && !force_scalar {
        println!("cargo:rustc-cfg=simd4_sse2");
    }
}
