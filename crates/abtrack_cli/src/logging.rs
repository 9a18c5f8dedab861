//! Log output setup.

use tracing_subscriber::EnvFilter;

use crate::GlobalArgs;

/// Filter used when `RUST_LOG` is not set.
fn default_directive(global: &GlobalArgs) -> &'static str {
    if global.verbose {
        "debug"
    } else if global.quiet {
        "error"
    } else {
        "info"
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` takes precedence over the
/// verbosity flags.
pub fn init(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(global)));
    // A subscriber may already be installed (tests); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(global.color)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(quiet: bool, verbose: bool) -> GlobalArgs {
        GlobalArgs {
            quiet,
            verbose,
            color: false,
        }
    }

    #[test]
    fn verbosity_selects_level() {
        assert_eq!(default_directive(&global(false, false)), "info");
        assert_eq!(default_directive(&global(true, false)), "error");
        assert_eq!(default_directive(&global(false, true)), "debug");
    }

    #[test]
    fn verbose_wins_over_quiet() {
        assert_eq!(default_directive(&global(true, true)), "debug");
    }
}
