use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($regex).expect("static pattern compiles"));
    };
}

// `key:value;` pairs of a summary line. Keys are identifiers, values run to the
// next semicolon.
regex!(SUMMARY_FIELD, r"([A-Za-z_][A-Za-z0-9_]*):([^;]*);");
// `0x000000000000000e (SONAME)  Library soname: [libfoo.so.1]`
regex!(READELF_SONAME, r"\(SONAME\)\s+Library soname:\s*\[([^\]]+)\]");
// First dotted numeric run of a `-dumpversion` answer.
regex!(DOTTED_VERSION, r"[0-9]+(?:\.[0-9]+)*");
