// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// This code is adapted from pkg-config-rs
// (https://github.com/rust-lang/pkg-config-rs).
#[cfg(feature = "link")]
#[allow(clippy::if_same_then_else, clippy::needless_bool)]
fn infer_static(name: &str) -> bool {
    if std::env::var(format!("{}_STATIC", name.to_uppercase())).is_ok() {
        true
    } else if std::env::var(format!("{}_DYNAMIC", name.to_uppercase())).is_ok() {
        false
    } else if std::env::var("PKG_CONFIG_ALL_STATIC").is_ok() {
        true
    } else if std::env::var("PKG_CONFIG_ALL_DYNAMIC").is_ok() {
        false
    } else {
        false
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=MIRLIB");

    // Gather build time info
    built::write_built_file().expect("Failed to acquire build-time information");

    #[cfg(feature = "link")]
    {
        // Link MIRIAD. If the library path manually specified, search there.
        if let Ok(lib_dir) = std::env::var("MIRLIB") {
            println!("cargo:rustc-link-search=native={}", lib_dir);
        }

        let kind = if cfg!(feature = "miriad-static") || infer_static("mir") {
            "static"
        } else {
            "dylib"
        };
        // Order matters for static archives: uvio depends on the core
        // library, which depends on wcslib.
        for lib in ["mir_uvio", "mir", "wcs"] {
            println!("cargo:rustc-link-lib={kind}={lib}");
        }
        if kind == "static" {
            println!("cargo:rustc-link-lib=m");
        }
    }
}
