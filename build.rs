fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::compile_protos("proto/drover.proto")?;
    println!("cargo:rerun-if-changed=proto/drover.proto");

    // Build metadata surfaced by /slave/info.json and /slave/vars.
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=BUILD_USER={user}");
    println!(
        "cargo:rustc-env=BUILD_DATE={}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );

    Ok(())
}
