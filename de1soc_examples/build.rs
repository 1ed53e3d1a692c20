use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let script = out_dir.join("de1soc.ld");
    fs::copy("de1soc.ld", &script).expect("failed to copy de1soc.ld");
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg=-Tde1soc.ld");
    println!("cargo:rerun-if-changed=de1soc.ld");
    println!("cargo:rerun-if-changed=build.rs");
}
