fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Source `protoc` from the vendored binary so the build does not
    // depend on a system-installed protobuf compiler.
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            // Safe: a build script runs single-threaded before any other
            // thread could observe the environment.
            unsafe {
                std::env::set_var("PROTOC", protoc);
            }
        }
    }
    tonic_build::compile_protos("proto/consensus.proto")?;
    Ok(())
}
