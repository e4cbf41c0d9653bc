use std::env;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_else(|_| String::from("unknown"));
    if target_os != "windows" {
        return;
    }

    println!("cargo:rerun-if-changed=assets/app/icon.ico");
    let mut res = winres::WindowsResource::new();
    if Path::new("assets/app/icon.ico").exists() {
        res.set_icon("assets/app/icon.ico");
    }

    let product = env::var("TANDEM_PRODUCT").unwrap_or_else(|_| "Tandem".into());
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".into());
    res.set("FileDescription", "Crossfading focus-music player");
    res.set("ProductName", &product);
    res.set("ProductVersion", &version);
    res.set("FileVersion", &version);
    res.set("OriginalFilename", "tandem.exe");
    res.set("InternalName", "tandem");

    if let Err(e) = res.compile() {
        eprintln!("Failed to embed Windows resources: {e}");
    }
}
