use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use quoteline_storage::{GroupId, RecipientId, RecipientStore};
use serde::{Serialize, Serializer};
use snafu::{ResultExt, ensure};

use super::error::{EmptyPaletteSnafu, InvalidNameColorSnafu, QuoteError, QuoteResult, StorageSnafu};

pub const DEFAULT_NAME_COLOR_PALETTE: [&str; 12] = [
    "#C73F3F", "#CB4B16", "#B45309", "#6F7D12", "#2F8F46", "#138577", "#1B7FA6", "#3A69C7",
    "#6A4FC9", "#9440B8", "#B8387D", "#8A6553",
];

/// RGB display color for an author's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameColor(u32);

impl NameColor {
    pub fn from_rgb(rgb: u32) -> Self {
        Self(rgb & 0x00FF_FFFF)
    }

    pub fn rgb(&self) -> u32 {
        self.0
    }

    pub fn parse(raw: &str) -> QuoteResult<Self> {
        let trimmed = raw.trim();
        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        ensure!(
            hex.len() == 6 && hex.chars().all(|character| character.is_ascii_hexdigit()),
            InvalidNameColorSnafu {
                stage: "name-color-parse-shape",
                raw: raw.to_string(),
            }
        );

        u32::from_str_radix(hex, 16)
            .map(Self::from_rgb)
            .map_err(|_| QuoteError::InvalidNameColor {
                stage: "name-color-parse-radix",
                raw: raw.to_string(),
            })
    }
}

impl fmt::Display for NameColor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{:06X}", self.0)
    }
}

impl FromStr for NameColor {
    type Err = QuoteError;

    fn from_str(raw: &str) -> QuoteResult<Self> {
        Self::parse(raw)
    }
}

impl Serialize for NameColor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

pub fn parse_palette(raw_palette: &[String]) -> QuoteResult<Vec<NameColor>> {
    let palette = raw_palette
        .iter()
        .map(|raw| NameColor::parse(raw))
        .collect::<QuoteResult<Vec<_>>>()?;
    ensure!(
        !palette.is_empty(),
        EmptyPaletteSnafu {
            stage: "name-color-palette-parse",
        }
    );
    Ok(palette)
}

pub fn default_palette() -> Vec<NameColor> {
    DEFAULT_NAME_COLOR_PALETTE
        .iter()
        .filter_map(|raw| NameColor::parse(raw).ok())
        .collect()
}

pub trait NameColorSource: Send + Sync {
    /// Colors for the group's current members, keyed by member.
    fn color_map_for(&self, group_id: GroupId) -> QuoteResult<HashMap<RecipientId, NameColor>>;
}

type GroupAssignments = HashMap<GroupId, HashMap<RecipientId, usize>>;

/// Palette-based color assignment that remembers every member it has colored,
/// so a member keeps its color while others join or leave.
pub struct GroupAuthorNameColorHelper {
    recipients: Arc<dyn RecipientStore>,
    palette: Vec<NameColor>,
    assignments: ArcSwap<GroupAssignments>,
}

impl GroupAuthorNameColorHelper {
    pub fn new(recipients: Arc<dyn RecipientStore>, palette: Vec<NameColor>) -> QuoteResult<Self> {
        ensure!(
            !palette.is_empty(),
            EmptyPaletteSnafu {
                stage: "name-color-helper-new",
            }
        );

        Ok(Self {
            recipients,
            palette,
            assignments: ArcSwap::from_pointee(HashMap::new()),
        })
    }

    pub fn with_default_palette(recipients: Arc<dyn RecipientStore>) -> Self {
        Self {
            recipients,
            palette: default_palette(),
            assignments: ArcSwap::from_pointee(HashMap::new()),
        }
    }
}

impl NameColorSource for GroupAuthorNameColorHelper {
    fn color_map_for(&self, group_id: GroupId) -> QuoteResult<HashMap<RecipientId, NameColor>> {
        let mut members = self
            .recipients
            .group_members(group_id)
            .context(StorageSnafu {
                stage: "name-color-group-members",
            })?;
        members.sort_unstable();

        let palette_len = self.palette.len();
        // The closure may rerun under contention; assignments only ever grow.
        self.assignments.rcu(|current| {
            let mut next = GroupAssignments::clone(current);
            assign_missing(next.entry(group_id).or_default(), &members, palette_len);
            next
        });

        let assignments = self.assignments.load();
        let remembered = assignments.get(&group_id);
        let colors = members
            .into_iter()
            .filter_map(|member| {
                let index = *remembered?.get(&member)?;
                Some((member, self.palette[index % palette_len]))
            })
            .collect::<HashMap<_, _>>();

        tracing::debug!(%group_id, members = colors.len(), "resolved group name colors");
        Ok(colors)
    }
}

// Each new member takes the least-used palette slot, lowest index first.
fn assign_missing(
    remembered: &mut HashMap<RecipientId, usize>,
    members: &[RecipientId],
    palette_len: usize,
) {
    let mut usage = vec![0_usize; palette_len];
    for index in remembered.values() {
        usage[index % palette_len] += 1;
    }

    for member in members {
        if remembered.contains_key(member) {
            continue;
        }

        let slot = usage
            .iter()
            .enumerate()
            .min_by_key(|(index, count)| (**count, *index))
            .map_or(0, |(index, _)| index);
        usage[slot] += 1;
        remembered.insert(*member, slot);
    }
}
