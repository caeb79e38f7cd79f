use std::path::Path;

use common::TagField;
use lofty::config::WriteOptions;
use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, ItemKey, TagExt, TaggedFileExt};
use lofty::tag::Tag;

/// The fields the scanner needs from one audio file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TagInfo {
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub disc_no: Option<u16>,
    pub total_discs: Option<u16>,
    pub duration_ms: Option<u32>,
}

impl TagInfo {
    pub fn field(&self, field: TagField) -> Option<&str> {
        match field {
            TagField::Artist => self.artist.as_deref(),
            TagField::AlbumArtist => self.album_artist.as_deref(),
            TagField::Album => self.album.as_deref(),
        }
    }
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
    NoTag(TagField),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
            MetadataError::NoTag(field) => {
                write!(f, "file has no tag that can hold {}", field.label())
            }
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Per-file tag reads and single-field writes.
///
/// Implementations must be shareable across scan workers.
pub trait TagAccessor: Sync {
    fn read(&self, path: &Path) -> Result<TagInfo, MetadataError>;

    /// Writes one field. A successful return means the file was saved.
    fn write(&self, path: &Path, field: TagField, value: &str) -> Result<(), MetadataError>;
}

/// [`TagAccessor`] backed by lofty (ID3v2, Vorbis comments, MP4 atoms, APE, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTags;

impl TagAccessor for LoftyTags {
    fn read(&self, path: &Path) -> Result<TagInfo, MetadataError> {
        read_tags(path)
    }

    fn write(&self, path: &Path, field: TagField, value: &str) -> Result<(), MetadataError> {
        write_field(path, field, value)
    }
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut info = TagInfo::default();

    let duration_ms = properties.duration().as_millis();
    if duration_ms > 0 {
        let clamped = duration_ms.min(u128::from(u32::MAX)) as u32;
        info.duration_ms = Some(clamped);
    }

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.artist = tag.get_string(&ItemKey::TrackArtist).and_then(clean_text);
        info.album_artist = tag.get_string(&ItemKey::AlbumArtist).and_then(clean_text);
        info.album = tag.get_string(&ItemKey::AlbumTitle).and_then(clean_text);
        if let Some(raw) = tag.get_string(&ItemKey::DiscNumber) {
            let (disc, total) = parse_disc(raw);
            info.disc_no = disc;
            info.total_discs = total;
        }
        if info.total_discs.is_none() {
            info.total_discs = tag
                .get_string(&ItemKey::DiscTotal)
                .and_then(|raw| parse_disc(raw).0);
        }
    }

    Ok(info)
}

/// Read-modify-write of a single text field.
///
/// Writes always go to the primary tag. When the file has none, it is seeded
/// from the tag [`read_tags`] would have used (an ID3v1 tag on an MP3, say),
/// so fields already present survive the write.
pub fn write_field(path: &Path, field: TagField, value: &str) -> Result<(), MetadataError> {
    let mut tagged_file = lofty::read_from_path(path)?;
    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        let mut seeded = tagged_file
            .first_tag()
            .cloned()
            .unwrap_or_else(|| Tag::new(tag_type));
        seeded.re_map(tag_type);
        tagged_file.insert_tag(seeded);
    }
    let tag = tagged_file
        .primary_tag_mut()
        .ok_or(MetadataError::NoTag(field))?;
    if !tag.insert_text(item_key(field), value.to_string()) {
        return Err(MetadataError::NoTag(field));
    }
    tag.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

fn item_key(field: TagField) -> ItemKey {
    match field {
        TagField::Artist => ItemKey::TrackArtist,
        TagField::AlbumArtist => ItemKey::AlbumArtist,
        TagField::Album => ItemKey::AlbumTitle,
    }
}

fn clean_text(value: &str) -> Option<String> {
    let trimmed = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses disc tags such as `2`, `1/2`, `1-2` or `1 of 2` into (disc, total).
pub fn parse_disc(text: &str) -> (Option<u16>, Option<u16>) {
    let text = text.trim();
    let (disc, rest) = match leading_number(text) {
        Some(found) => found,
        None => return (None, None),
    };

    let rest = rest.trim_start();
    let rest = if let Some(stripped) = rest.strip_prefix(['/', '-']) {
        stripped
    } else if rest.get(..2).is_some_and(|head| head.eq_ignore_ascii_case("of")) {
        &rest[2..]
    } else {
        return (Some(disc), None);
    };

    let total = leading_number(rest.trim_start()).map(|(total, _)| total);
    (Some(disc), total)
}

fn leading_number(text: &str) -> Option<(u16, &str)> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let value = text[..end].parse().ok()?;
    Some((value, &text[end..]))
}

#[cfg(test)]
mod tests {
    use super::{clean_text, parse_disc, read_tags, write_field, MetadataError, TagInfo};
    use common::TagField;
    use std::io::Write;
    use std::path::Path;

    /// MPEG-1 Layer III, 128 kbit/s, 44.1 kHz: 417-byte frames.
    fn mpeg_frames(count: usize) -> Vec<u8> {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        frame.repeat(count)
    }

    fn id3v1(artist: &str, album: &str) -> Vec<u8> {
        fn field(text: &str, len: usize) -> Vec<u8> {
            let mut bytes = text.as_bytes().to_vec();
            bytes.resize(len, 0);
            bytes
        }
        let mut tag = b"TAG".to_vec();
        tag.extend(field("Intro", 30));
        tag.extend(field(artist, 30));
        tag.extend(field(album, 30));
        tag.extend(field("2001", 4));
        tag.extend(field("", 30));
        tag.push(255);
        tag
    }

    fn mp3_with(tail: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(&mpeg_frames(8)).unwrap();
        file.write_all(tail).unwrap();
        file.flush().unwrap();
        file
    }

    fn read(path: &Path) -> TagInfo {
        read_tags(path).unwrap()
    }

    #[test]
    fn parses_plain_disc_number() {
        assert_eq!(parse_disc("2"), (Some(2), None));
        assert_eq!(parse_disc(" 03 "), (Some(3), None));
    }

    #[test]
    fn parses_disc_with_total() {
        assert_eq!(parse_disc("1/2"), (Some(1), Some(2)));
        assert_eq!(parse_disc("1 - 3"), (Some(1), Some(3)));
        assert_eq!(parse_disc("2 of 4"), (Some(2), Some(4)));
        assert_eq!(parse_disc("2 OF 4"), (Some(2), Some(4)));
    }

    #[test]
    fn rejects_non_numeric_disc() {
        assert_eq!(parse_disc("A"), (None, None));
        assert_eq!(parse_disc(""), (None, None));
        assert_eq!(parse_disc("1/x"), (Some(1), None));
    }

    #[test]
    fn blank_text_is_absent() {
        assert_eq!(clean_text("   "), None);
        assert_eq!(clean_text("\0"), None);
        assert_eq!(clean_text(" Guitar Man ").as_deref(), Some("Guitar Man"));
    }

    #[test]
    fn field_accessor_maps_each_field() {
        let info = TagInfo {
            artist: Some("a".into()),
            album_artist: Some("b".into()),
            album: Some("c".into()),
            ..TagInfo::default()
        };
        assert_eq!(info.field(TagField::Artist), Some("a"));
        assert_eq!(info.field(TagField::AlbumArtist), Some("b"));
        assert_eq!(info.field(TagField::Album), Some("c"));
    }

    #[test]
    fn writing_keeps_fields_from_a_secondary_tag() {
        let file = mp3_with(&id3v1("Guitar Man", "Shred"));
        let before = read(file.path());
        assert_eq!(before.artist.as_deref(), Some("Guitar Man"));
        assert_eq!(before.album.as_deref(), Some("Shred"));
        assert_eq!(before.album_artist, None);

        write_field(file.path(), TagField::AlbumArtist, "Guitar Man").unwrap();

        let after = read(file.path());
        assert_eq!(after.artist.as_deref(), Some("Guitar Man"));
        assert_eq!(after.album.as_deref(), Some("Shred"));
        assert_eq!(after.album_artist.as_deref(), Some("Guitar Man"));
    }

    #[test]
    fn rewriting_a_field_keeps_the_others() {
        let file = mp3_with(&id3v1("guitar man", "shred"));
        write_field(file.path(), TagField::Album, "Shred").unwrap();
        write_field(file.path(), TagField::Artist, "Guitar Man").unwrap();

        let after = read(file.path());
        assert_eq!(after.artist.as_deref(), Some("Guitar Man"));
        assert_eq!(after.album.as_deref(), Some("Shred"));
    }

    #[test]
    fn untagged_file_gets_a_new_tag() {
        let file = mp3_with(&[]);
        assert_eq!(read(file.path()).artist, None);

        write_field(file.path(), TagField::Artist, "Guitar Man").unwrap();

        let after = read(file.path());
        assert_eq!(after.artist.as_deref(), Some("Guitar Man"));
        assert_eq!(after.album, None);
    }

    #[test]
    fn garbage_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(b"definitely not an mp3 frame").unwrap();
        let err = read_tags(file.path()).unwrap_err();
        assert!(matches!(err, MetadataError::Lofty(_) | MetadataError::Io(_)));
    }
}
