fn main() {
    // Add ~/.vosk/lib to the native library search path for libvosk
    if std::env::var_os("CARGO_FEATURE_VOSK").is_none() {
        return;
    }
    if let Some(home) = dirs::home_dir() {
        let lib_path = home.join(".vosk/lib");
        if lib_path.exists() {
            println!("cargo:rustc-link-search=native={}", lib_path.display());
            // Set rpath so the shared library is found at runtime too
            println!("cargo:rustc-link-arg=-Wl,-rpath,{}", lib_path.display());
        }
    }
}
