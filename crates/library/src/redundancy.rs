use std::collections::BTreeMap;

use serde::Serialize;

use crate::grouping::AlbumGroup;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedundancyReason {
    /// At least one track in the bucket has no disc number.
    MissingDiscTags,
    /// A single folder holds more than one disc number.
    InconsistentDiscTags,
    DuplicateDiscNumbers,
    /// Disc numbers are present but do not run 1..=n.
    NonContiguousDiscs,
}

impl RedundancyReason {
    pub fn describe(self) -> &'static str {
        match self {
            RedundancyReason::MissingDiscTags => "missing disc tags",
            RedundancyReason::InconsistentDiscTags => "mixed disc numbers inside a folder",
            RedundancyReason::DuplicateDiscNumbers => "same disc number in several folders",
            RedundancyReason::NonContiguousDiscs => "disc numbers do not run from 1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    MultiDisc,
    Redundant(RedundancyReason),
}

/// One album identity found in two or more folders.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlbumBucket {
    pub album_artist: String,
    pub album: String,
    /// Largest folder first, ties broken by path.
    pub groups: Vec<AlbumGroup>,
    pub verdict: Verdict,
}

impl AlbumBucket {
    pub fn primary(&self) -> &AlbumGroup {
        &self.groups[0]
    }

    pub fn copies(&self) -> &[AlbumGroup] {
        &self.groups[1..]
    }

    pub fn is_redundant(&self) -> bool {
        matches!(self.verdict, Verdict::Redundant(_))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RedundancyReport {
    pub buckets: Vec<AlbumBucket>,
}

impl RedundancyReport {
    pub fn redundant(&self) -> impl Iterator<Item = &AlbumBucket> {
        self.buckets.iter().filter(|bucket| bucket.is_redundant())
    }

    pub fn multi_disc(&self) -> impl Iterator<Item = &AlbumBucket> {
        self.buckets.iter().filter(|bucket| !bucket.is_redundant())
    }

    /// Folders beyond the primary copy across all redundant buckets.
    pub fn redundant_album_count(&self) -> usize {
        self.redundant().map(|bucket| bucket.copies().len()).sum()
    }

    pub fn redundant_track_count(&self) -> usize {
        self.redundant()
            .flat_map(|bucket| bucket.copies())
            .map(AlbumGroup::track_count)
            .sum()
    }
}

pub fn classify(groups: &[AlbumGroup]) -> RedundancyReport {
    let mut by_identity: BTreeMap<(&str, &str), Vec<&AlbumGroup>> = BTreeMap::new();
    for group in groups {
        if group.has_unknown {
            continue;
        }
        by_identity.entry(group.key.identity()).or_default().push(group);
    }

    let mut buckets = Vec::new();
    for (_, members) in by_identity {
        if members.len() < 2 {
            continue;
        }
        let mut members: Vec<AlbumGroup> = members.into_iter().cloned().collect();
        members.sort_by(|a, b| {
            b.track_count()
                .cmp(&a.track_count())
                .then_with(|| a.directory.cmp(&b.directory))
        });
        let verdict = disc_verdict(&members);
        buckets.push(AlbumBucket {
            album_artist: members[0].album_artist.clone(),
            album: members[0].album.clone(),
            groups: members,
            verdict,
        });
    }

    RedundancyReport { buckets }
}

fn disc_verdict(groups: &[AlbumGroup]) -> Verdict {
    if groups.iter().any(|group| group.untagged_disc_tracks > 0) {
        return Verdict::Redundant(RedundancyReason::MissingDiscTags);
    }
    if groups.iter().any(|group| group.disc_numbers.len() != 1) {
        return Verdict::Redundant(RedundancyReason::InconsistentDiscTags);
    }

    let mut discs: Vec<u16> = groups
        .iter()
        .filter_map(|group| group.disc_numbers.iter().next().copied())
        .collect();
    discs.sort_unstable();
    let before = discs.len();
    discs.dedup();
    if discs.len() != before {
        return Verdict::Redundant(RedundancyReason::DuplicateDiscNumbers);
    }

    let contiguous = discs
        .iter()
        .enumerate()
        .all(|(idx, disc)| usize::from(*disc) == idx + 1);
    if contiguous {
        Verdict::MultiDisc
    } else {
        Verdict::Redundant(RedundancyReason::NonContiguousDiscs)
    }
}
