use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Frameworks required by the CoreML execution provider on Apple targets
    if env::var("CARGO_CFG_TARGET_VENDOR").as_deref() == Ok("apple") {
        for framework in ["CoreML", "Foundation", "Accelerate"] {
            println!("cargo:rustc-link-lib=framework={}", framework);
        }
    }
}
