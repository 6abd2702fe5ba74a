// SPDX-FileCopyrightText: 2020 Sean Cross <sean@xobs.io>
// SPDX-License-Identifier: Apache-2.0

use std::env;

fn main() {
    let target = env::var("TARGET").unwrap();
    let target_os = target.split('-').nth(2).unwrap_or("none");

    // Targets without a desktop-class OS get the "baremetal" cfg, which selects
    // the no_std code paths used on the real MIPS-style target this crate models.
    // Hosted builds (the default, used for `cargo test`) keep std available so the
    // property and scenario tests in this crate can run as ordinary unit tests.
    if target_os == "none" {
        println!("cargo:rustc-cfg=baremetal");
    }
    println!("cargo:rustc-check-cfg=cfg(baremetal)");
    println!("cargo:rerun-if-changed=build.rs");
}
