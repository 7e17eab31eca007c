//! Templates compiled into the binary.

use include_dir::{include_dir, Dir};

static ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");

/// Embedded template at `path` (forward slashes, relative to the asset root).
pub fn embedded(path: &str) -> Option<&'static str> {
    ASSETS.get_file(path).and_then(|f| f.contents_utf8())
}

/// Paths of every embedded file under `dir`, sorted.
pub fn list(dir: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(d) = ASSETS.get_dir(dir) {
        collect(d, &mut out);
    }
    out.sort();
    out
}

fn collect(dir: &Dir<'_>, out: &mut Vec<String>) {
    for f in dir.files() {
        out.push(f.path().to_string_lossy().replace('\\', "/"));
    }
    for d in dir.dirs() {
        collect(d, out);
    }
}
