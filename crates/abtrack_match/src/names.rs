//! Name normalization for object matching.

use regex::Regex;
use std::sync::LazyLock;

static SHARED_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.so(\.[0-9]+)*$").expect("static pattern compiles"));
static KERNEL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.ko$").expect("static pattern compiles"));
static VERSION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-.][0-9]+").expect("static pattern compiles"));

/// Strips the shared-library version suffix: `libfoo.so.1.2` → `libfoo`.
///
/// In kernel mode the `.ko` extension is stripped instead.
pub fn short_name(file_name: &str, kernel: bool) -> String {
    let suffix = if kernel { &*KERNEL_SUFFIX } else { &*SHARED_SUFFIX };
    suffix.replace(file_name, "").into_owned()
}

/// Additionally strips embedded version tokens: `libfoo-2.4.so` → `libfoo`.
pub fn super_short_name(file_name: &str, kernel: bool) -> String {
    VERSION_TOKEN
        .replace_all(&short_name(file_name, kernel), "")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_so_suffix() {
        assert_eq!(short_name("libfoo.so.1", false), "libfoo");
        assert_eq!(short_name("libfoo.so.1.2.3", false), "libfoo");
        assert_eq!(short_name("libfoo.so", false), "libfoo");
        assert_eq!(short_name("libfoo-2.4.so", false), "libfoo-2.4");
    }

    #[test]
    fn kernel_mode_strips_ko() {
        assert_eq!(short_name("e1000e.ko", true), "e1000e");
        assert_eq!(short_name("libfoo.so.1", true), "libfoo.so.1");
    }

    #[test]
    fn super_short_drops_version_tokens() {
        assert_eq!(super_short_name("libfoo-2.4.so", false), "libfoo");
        assert_eq!(super_short_name("libgtk-3.so.0", false), "libgtk");
        assert_eq!(super_short_name("libbar.so.5", false), "libbar");
    }
}
