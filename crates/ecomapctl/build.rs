// Build script for ecomapctl - embeds version at compile time

fn main() {
    // Release pipelines may override the crate version
    let version =
        std::env::var("ECOMAP_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=ECOMAP_VERSION={}", version);

    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed=ECOMAP_VERSION");
}
