//! `abtrack build` — brings a library's artifacts up to date.
//!
//! Orchestrates one run:
//! 1. Load the profile
//! 2. Start the process runtime and the interrupt listener
//! 3. Probe the live checkout for its upstream marker
//! 4. Resolve the run context
//! 5. Locate the tools the selected stages need
//! 6. Open (and repair) the artifact store
//! 7. Run the pipeline and report

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use abtrack_cache::ArtifactStore;
use abtrack_config::{live_source, load_profile, resolve_run_context, RunOptions, ScmKind};
use abtrack_diagnostics::{
    Diagnostic, DiagnosticRenderer, DiagnosticSink, Severity, TerminalRenderer,
};
use abtrack_pipeline::{PipelineOrchestrator, RunReport};
use abtrack_tools::{GitProbe, ProcessRunner, ScmProbe, SvnProbe, ToolError, Toolset, Upstream};

use crate::codes::{CACHE_UNUSABLE, PROFILE_UNREADABLE, TOOL_UNAVAILABLE, UPSTREAM_UNKNOWN};
use crate::{profile_dir, BuildArgs, GlobalArgs, EXIT_INTERRUPTED};

/// Runs the `abtrack build` command.
///
/// Returns exit code 0 on completion (per-item failures included), 1 on a
/// fatal or access error, and 130 when interrupted.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let sink = DiagnosticSink::new();

    // Step 1: Load the profile
    let profile = match load_profile(&args.profile) {
        Ok(profile) => profile,
        Err(e) => {
            sink.emit(
                Diagnostic::error(
                    PROFILE_UNREADABLE,
                    format!("cannot load profile {}", args.profile.display()),
                )
                .with_note(e.to_string()),
            );
            render_diagnostics(&sink, global);
            return Ok(1);
        }
    };
    let base_dir = profile_dir(&args.profile);

    if !global.quiet {
        eprintln!(
            "   Tracking {} ({} versions)",
            profile.library.name,
            profile.versions.len()
        );
    }

    // Step 2: Process runtime and interrupt listener
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("abtrack-io")
        .enable_all()
        .build()?;
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing the current items");
            flag.store(true, Ordering::SeqCst);
        }
    });
    let runner = Arc::new(ProcessRunner::new(
        runtime.handle().clone(),
        profile.settings.tool_timeout(),
    ));

    // Step 3: Upstream marker of the live checkout
    let upstream = match live_source(&profile, &base_dir) {
        Some(dir) => probe_upstream(profile.library.scm, &dir, &runner, &sink),
        None => None,
    };

    // Step 4: Resolve the run context
    let options = RunOptions {
        rebuild: args.rebuild,
        target_version: args.target_version.clone(),
        stages: args.stages.clone(),
        upstream_marker: upstream.as_ref().map(|u| u.marker.clone()),
        upstream_time: upstream.as_ref().and_then(|u| u.timestamp),
        cancel,
    };
    let ctx = match resolve_run_context(&profile, &base_dir, options) {
        Ok(ctx) => ctx,
        Err(e) => {
            sink.emit(
                Diagnostic::error(
                    PROFILE_UNREADABLE,
                    format!("cannot resolve profile {}", args.profile.display()),
                )
                .with_note(e.to_string()),
            );
            render_diagnostics(&sink, global);
            return Ok(1);
        }
    };

    // Step 5: Locate the tools
    let tools = match Toolset::discover(&ctx.stages, Arc::clone(&runner)) {
        Ok(tools) => tools,
        Err(errors) => {
            for error in errors {
                sink.emit(tool_diagnostic(&error));
            }
            render_diagnostics(&sink, global);
            return Ok(1);
        }
    };

    // Step 6: Open the store
    let opened = std::fs::create_dir_all(&ctx.cache_root)
        .map_err(|e| e.to_string())
        .and_then(|()| ArtifactStore::open(&ctx.cache_root, &ctx.library).map_err(|e| e.to_string()));
    let store = match opened {
        Ok((store, repair)) => {
            if !repair.is_clean() {
                tracing::info!(
                    dropped = repair.dropped.len(),
                    dropped_summaries = repair.dropped_summaries.len(),
                    removed_files = repair.removed_files,
                    "repaired artifact store"
                );
            }
            store
        }
        Err(e) => {
            sink.emit(
                Diagnostic::error(
                    CACHE_UNUSABLE,
                    format!("cannot use cache directory {}", ctx.cache_root.display()),
                )
                .with_note(e),
            );
            render_diagnostics(&sink, global);
            return Ok(1);
        }
    };

    // Step 7: Run the pipeline
    let outcome = PipelineOrchestrator::new(&ctx, &tools, &sink, store).and_then(|pipeline| pipeline.run());
    render_diagnostics(&sink, global);
    let report = outcome?;
    print_report(&report, &sink, global);

    if report.interrupted {
        eprintln!("   Interrupted; completed artifacts were saved");
        return Ok(EXIT_INTERRUPTED);
    }
    Ok(0)
}

/// Reads the upstream marker of the live checkout.
///
/// Without one, live artifacts are rebuilt only on `--rebuild`; that is
/// reported as a warning.
fn probe_upstream(
    scm: ScmKind,
    dir: &Path,
    runner: &Arc<ProcessRunner>,
    sink: &DiagnosticSink,
) -> Option<Upstream> {
    let probed: Result<Upstream, ToolError> = match scm {
        ScmKind::None => return None,
        ScmKind::Git => GitProbe::locate(Arc::clone(runner)).and_then(|probe| probe.probe(dir)),
        ScmKind::Svn => SvnProbe::locate(Arc::clone(runner)).and_then(|probe| probe.probe(dir)),
    };
    match probed {
        Ok(upstream) if !upstream.marker.is_empty() => {
            tracing::debug!(marker = %upstream.marker, "probed live checkout");
            Some(upstream)
        }
        Ok(_) => {
            sink.emit(Diagnostic::warning(
                UPSTREAM_UNKNOWN,
                format!("{} reported no revision for the live checkout", dir.display()),
            ));
            None
        }
        Err(e) => {
            sink.emit(
                Diagnostic::warning(
                    UPSTREAM_UNKNOWN,
                    format!("cannot read the revision of {}", dir.display()),
                )
                .with_note(e.to_string()),
            );
            None
        }
    }
}

fn tool_diagnostic(error: &ToolError) -> Diagnostic {
    let diagnostic = Diagnostic::fatal(TOOL_UNAVAILABLE, error.to_string());
    match error {
        ToolError::NotFound { .. } => diagnostic.with_note("install it or add it to PATH"),
        _ => diagnostic,
    }
}

/// Prints and drains the collected diagnostics.
fn render_diagnostics(sink: &DiagnosticSink, global: &GlobalArgs) {
    let renderer = TerminalRenderer::new(global.color);
    for diagnostic in sink.take_all() {
        if global.quiet && !diagnostic.severity.is_error() {
            continue;
        }
        eprint!("{}", renderer.render(&diagnostic));
    }
}

fn print_report(report: &RunReport, sink: &DiagnosticSink, global: &GlobalArgs) {
    if global.quiet {
        return;
    }
    for (stage, counts) in &report.stages {
        eprintln!("{:>12} {counts}", stage.name());
    }
    eprintln!("{:>12} {}", "tools", report.tool_invocations);
    eprintln!(
        "{:>12} {} errors, {} warnings",
        "problems",
        sink.error_count(),
        sink.count(Severity::Warning)
    );

    if !global.verbose {
        return;
    }
    for pair in &report.summaries {
        let s = &pair.summary;
        eprintln!(
            "   {} -> {}: {:.1}% backward compatible, +{} -{} symbols, {} problems",
            pair.old, pair.new, s.backward_compat, s.added, s.removed, s.problems
        );
        for (label, objects) in [
            ("added", &s.added_objects),
            ("removed", &s.removed_objects),
            ("renamed", &s.renamed_objects),
            ("soname changed", &s.soname_changes),
        ] {
            if !objects.is_empty() {
                let names: Vec<String> = objects.iter().map(|p| p.display().to_string()).collect();
                eprintln!("      {label}: {}", names.join(", "));
            }
        }
    }
}
