fn main() {
    // Rerun when script fixtures are added or changed
    println!("cargo:rerun-if-changed=tests/scripts");

    let script_dir = std::path::Path::new("tests/scripts");
    let Ok(entries) = std::fs::read_dir(script_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            println!("cargo:rerun-if-changed={}", path.display());
        }
    }
}
