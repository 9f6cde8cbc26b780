//! Merge driver
//!
//! Runs every configured source through load -> extract ids -> parse ->
//! transform, strictly one after another, folding the results into a single
//! [`GuideAccumulator`]. A failing source is logged and skipped.

use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::SourceConfig;
use crate::epg::{parse_document, write_guide, GeneratorInfo, GuideAccumulator, MergeStats, ParseRoute};
use crate::errors::{OutputError, SkipReason};
use crate::loader::SourceLoader;
use crate::m3u_parser::{extract_tvg_ids, header_epg_url};

/// What happened to one source
#[derive(Debug)]
pub enum SourceOutcome {
    Merged { name: String, stats: MergeStats },
    Skipped { name: String, reason: SkipReason },
}

/// Accumulated output plus a per-source account of the run
#[derive(Debug, Default)]
pub struct RunReport {
    pub guide: GuideAccumulator,
    pub outcomes: Vec<SourceOutcome>,
}

impl RunReport {
    pub fn merged_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SourceOutcome::Merged { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.merged_count()
    }
}

/// Process all sources in order
pub fn run_sources(sources: &[SourceConfig], loader: &dyn SourceLoader) -> RunReport {
    let mut report = RunReport::default();

    if sources.is_empty() {
        warn!("No sources configured");
    }

    for (index, source) in sources.iter().enumerate() {
        info!(
            "[{}/{}] Processing source '{}' (offset {:+}h)",
            index + 1,
            sources.len(),
            source.name,
            source.offset_hours
        );

        let outcome = match merge_source(source, loader, &mut report.guide) {
            Ok(stats) => {
                info!(
                    "Source '{}': added {} channels, {} programmes",
                    source.name, stats.channels, stats.programmes
                );
                if stats.unshifted_times > 0 {
                    debug!(
                        "Source '{}': {} start/stop values kept unshifted (unparseable)",
                        source.name, stats.unshifted_times
                    );
                }
                SourceOutcome::Merged {
                    name: source.name.clone(),
                    stats,
                }
            }
            Err(reason) => {
                warn!("Skipping source '{}': {}", source.name, reason);
                SourceOutcome::Skipped {
                    name: source.name.clone(),
                    reason,
                }
            }
        };
        report.outcomes.push(outcome);
    }

    info!(
        "Run complete: {} merged, {} skipped, {} channels, {} programmes",
        report.merged_count(),
        report.skipped_count(),
        report.guide.channel_count(),
        report.guide.programme_count()
    );

    report
}

/// One source's turn at the accumulator. Nothing is touched unless the
/// guide parsed.
pub fn merge_source(
    source: &SourceConfig,
    loader: &dyn SourceLoader,
    guide: &mut GuideAccumulator,
) -> Result<MergeStats, SkipReason> {
    info!("Downloading playlist: {}", source.playlist_url);
    let playlist = loader
        .load(&source.playlist_url)
        .map_err(SkipReason::PlaylistUnavailable)?;

    let valid_ids = extract_tvg_ids(&playlist);
    info!("Playlist has {} unique tvg-id values", valid_ids.len());
    if valid_ids.is_empty() {
        return Err(SkipReason::NoIdentifiers);
    }

    let epg_url = if source.epg_url.is_empty() {
        let url = header_epg_url(&playlist).ok_or(SkipReason::NoEpgUrl)?;
        debug!("Source '{}': EPG taken from playlist header", source.name);
        url
    } else {
        source.epg_url.clone()
    };

    info!("Downloading EPG: {}", epg_url);
    let epg = loader.load(&epg_url).map_err(SkipReason::EpgUnavailable)?;

    info!("Parsing XMLTV data ({} bytes)", epg.len());
    let document = parse_document(&epg)?;
    if let ParseRoute::Lossy { ref strict } = document.route {
        warn!(
            "Source '{}': EPG is not well-formed ({}); parsed after lossy decoding",
            source.name, strict
        );
    }

    Ok(guide.absorb(document.root, &valid_ids, source.offset_hours))
}

/// Write the guide unless it is empty. Returns the path written, if any.
pub fn persist(
    guide: &GuideAccumulator,
    path: &Path,
    generator: &GeneratorInfo,
) -> Result<Option<PathBuf>, OutputError> {
    if guide.is_empty() {
        warn!("No channels or programmes collected; {} not written", path.display());
        return Ok(None);
    }

    match write_guide(path, guide.children(), generator) {
        Ok(bytes) => {
            info!("Wrote {} ({} bytes)", path.display(), bytes);
            Ok(Some(path.to_path_buf()))
        }
        Err(e) => {
            error!("Failed to write guide: {}", e);
            Err(e)
        }
    }
}
