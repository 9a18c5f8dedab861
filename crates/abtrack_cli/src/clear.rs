//! `abtrack clear` — deletes a library's cache namespace.

use abtrack_cache::ArtifactStore;
use abtrack_config::{library_cache_root, load_profile};
use abtrack_diagnostics::{Diagnostic, DiagnosticRenderer, TerminalRenderer};

use crate::codes::{CACHE_UNUSABLE, PROFILE_UNREADABLE};
use crate::{profile_dir, ClearArgs, GlobalArgs};

/// Runs the `abtrack clear` command.
///
/// Removes the store and every artifact of the profile's library. Other
/// libraries sharing the cache directory are left alone.
pub fn run(args: &ClearArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let renderer = TerminalRenderer::new(global.color);

    let profile = match load_profile(&args.profile) {
        Ok(profile) => profile,
        Err(e) => {
            let diagnostic = Diagnostic::error(
                PROFILE_UNREADABLE,
                format!("cannot load profile {}", args.profile.display()),
            )
            .with_note(e.to_string());
            eprint!("{}", renderer.render(&diagnostic));
            return Ok(1);
        }
    };
    let root = library_cache_root(&profile, &profile_dir(&args.profile));

    match ArtifactStore::clear(&root) {
        Ok(true) => {
            tracing::info!(root = %root.display(), "cache cleared");
            if !global.quiet {
                eprintln!("     Cleared {}", root.display());
            }
            Ok(0)
        }
        Ok(false) => {
            if !global.quiet {
                eprintln!("     Nothing to clear for {}", profile.library.name);
            }
            Ok(0)
        }
        Err(e) => {
            let diagnostic = Diagnostic::error(
                CACHE_UNUSABLE,
                format!("cannot clear cache directory {}", root.display()),
            )
            .with_note(e.to_string());
            eprint!("{}", renderer.render(&diagnostic));
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            color: false,
        }
    }

    fn write_profile(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(format!("{name}.toml"));
        std::fs::write(
            &path,
            format!("[library]\nname = \"{name}\"\n[[versions]]\nnumber = \"1.0\"\nsource = \"a.tar.gz\"\n"),
        )
        .unwrap();
        path
    }

    #[test]
    fn clears_only_the_profiles_library() {
        let dir = tempfile::tempdir().unwrap();
        let foo = write_profile(dir.path(), "libfoo");
        write_profile(dir.path(), "libbar");
        for lib in ["libfoo", "libbar"] {
            let root = dir.path().join("abtrack-cache").join(lib).join("abi_dump");
            std::fs::create_dir_all(&root).unwrap();
            std::fs::write(root.join("ABI.dump"), "dump").unwrap();
        }

        let code = run(&ClearArgs { profile: foo.clone() }, &global()).unwrap();
        assert_eq!(code, 0);
        assert!(!dir.path().join("abtrack-cache/libfoo").exists());
        assert!(dir.path().join("abtrack-cache/libbar/abi_dump/ABI.dump").exists());

        // Clearing again is a no-op.
        assert_eq!(run(&ClearArgs { profile: foo }, &global()).unwrap(), 0);
    }

    #[test]
    fn unreadable_profile_exits_with_one() {
        let dir = tempfile::tempdir().unwrap();
        let args = ClearArgs {
            profile: dir.path().join("absent.toml"),
        };
        assert_eq!(run(&args, &global()).unwrap(), 1);
    }
}
