//! Filtering, channel de-duplication and time shifting of parsed guides
//!
//! A [`GuideAccumulator`] is threaded through every source of a run. Each
//! source contributes the `<channel>` and `<programme>` elements whose ids
//! appear in its playlist; a channel definition is only taken from the first
//! source that offers it, programmes are always taken.

use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;

use super::node::XmlNode;
use crate::m3u_parser::ValidIds;

pub const TAG_CHANNEL: &str = "channel";
pub const TAG_PROGRAMME: &str = "programme";

const ATTR_ID: &str = "id";
const ATTR_CHANNEL: &str = "channel";
const TIME_ATTRS: [&str; 2] = ["start", "stop"];

/// XMLTV date-time without the zone part, e.g. `20240115120000`
const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S";
const XMLTV_TIME_LEN: usize = 14;

/// What one source added to the accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub channels: usize,
    pub programmes: usize,
    /// start/stop values left as-is because they did not parse
    pub unshifted_times: usize,
}

/// Output children plus the ids whose `<channel>` is already in them
#[derive(Debug, Default)]
pub struct GuideAccumulator {
    children: Vec<XmlNode>,
    seen_channels: HashSet<String>,
}

impl GuideAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the wanted children of a parsed guide root into the output.
    ///
    /// Elements keep their source order; anything that is neither a
    /// `<channel>` nor a `<programme>` is ignored.
    pub fn absorb(&mut self, root: XmlNode, valid_ids: &ValidIds, offset_hours: i32) -> MergeStats {
        let mut stats = MergeStats::default();

        for child in root.into_elements() {
            match child.name.as_str() {
                TAG_CHANNEL => {
                    let Some(id) = child.attribute(ATTR_ID) else { continue };
                    if !valid_ids.contains(id) || self.seen_channels.contains(id) {
                        continue;
                    }
                    self.seen_channels.insert(id.to_string());
                    self.children.push(child);
                    stats.channels += 1;
                }
                TAG_PROGRAMME => {
                    let wanted = child
                        .attribute(ATTR_CHANNEL)
                        .is_some_and(|id| valid_ids.contains(id));
                    if !wanted {
                        continue;
                    }
                    let mut programme = child;
                    stats.unshifted_times += shift_programme(&mut programme, offset_hours);
                    self.children.push(programme);
                    stats.programmes += 1;
                }
                _ => {}
            }
        }

        stats
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn seen_channels(&self) -> &HashSet<String> {
        &self.seen_channels
    }

    pub fn channel_count(&self) -> usize {
        self.seen_channels.len()
    }

    pub fn programme_count(&self) -> usize {
        self.children.len() - self.seen_channels.len()
    }
}

/// Shift start/stop of a programme in place; returns how many values could
/// not be parsed and were kept unchanged
fn shift_programme(programme: &mut XmlNode, offset_hours: i32) -> usize {
    if offset_hours == 0 {
        return 0;
    }

    let mut unshifted = 0;
    for attr in TIME_ATTRS {
        let Some(value) = programme.attribute(attr) else { continue };
        match shift_timestamp(value, offset_hours) {
            Some(shifted) => programme.set_attribute(attr, shifted),
            None => unshifted += 1,
        }
    }
    unshifted
}

/// Add `offset_hours` to an XMLTV timestamp such as `20240101000000 +0000`.
///
/// Only the first fourteen characters are interpreted; whatever follows is
/// carried over untouched. Returns `None` when those characters are not a
/// valid date-time.
pub fn shift_timestamp(value: &str, offset_hours: i32) -> Option<String> {
    if offset_hours == 0 {
        return Some(value.to_string());
    }

    let split = value
        .char_indices()
        .nth(XMLTV_TIME_LEN)
        .map_or(value.len(), |(i, _)| i);
    let (time_part, suffix) = value.split_at(split);

    if time_part.len() != XMLTV_TIME_LEN || !time_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let parsed = NaiveDateTime::parse_from_str(time_part, XMLTV_TIME_FORMAT).ok()?;
    let shifted = parsed.checked_add_signed(Duration::hours(i64::from(offset_hours)))?;
    Some(format!("{}{}", shifted.format(XMLTV_TIME_FORMAT), suffix))
}
