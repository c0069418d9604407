/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use git2::Repository;

struct GitInfo {
    commit_hash: String,
    commit_short_hash: String,
    commit_datetime: String,
}

impl GitInfo {
    const fn unknown() -> Self {
        Self {
            commit_hash: String::new(),
            commit_short_hash: String::new(),
            commit_datetime: String::new(),
        }
    }

    /// Tarball or vendored builds have no repository, banner falls back to "unknown".
    fn read() -> Result<Self, git2::Error> {
        let repo = Repository::open(".")?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        let commit_hash = commit.id().to_string();
        let commit_short_hash = commit
            .as_object()
            .short_id()?
            .as_str()
            .unwrap_or_default()
            .to_ascii_lowercase();

        let is_dirty = repo.statuses(None)?.iter().any(|status| {
            let s = status.status();
            !((s == git2::Status::CURRENT) | (s == git2::Status::IGNORED))
        });

        let (dirty_str, short_dirty_str) = if is_dirty {
            ("-dirty", "-d")
        } else {
            ("", "")
        };

        let commit_datetime = Command::new("git")
            .args(["log", "-1", "--format=%ai", &commit_hash])
            .output()
            .map(|x| String::from_utf8_lossy(&x.stdout).trim().to_owned())
            .unwrap_or_default();

        Ok(Self {
            commit_hash: format!("{}{}", commit_hash, dirty_str),
            commit_short_hash: format!("{}{}", commit_short_hash, short_dirty_str),
            commit_datetime,
        })
    }
}

fn main() {
    // registry pages live right after the program image, memory.x keeps the linker off them
    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(include_bytes!("memory.x"))
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    let git = GitInfo::read().unwrap_or_else(|e| {
        println!("cargo:warning=git information unavailable : {}", e.message());
        GitInfo::unknown()
    });

    let or_unknown = |s: &str| match s.is_empty() {
        true => "unknown".to_owned(),
        false => s.to_owned(),
    };

    println!(
        "cargo:rustc-env=GIT_COMMIT_HASH={}",
        or_unknown(&git.commit_hash)
    );
    println!(
        "cargo:rustc-env=GIT_COMMIT_SHORT_HASH={}",
        or_unknown(&git.commit_short_hash)
    );
    println!(
        "cargo:rustc-env=GIT_COMMIT_DATETIME={}",
        or_unknown(&git.commit_datetime)
    );
}
