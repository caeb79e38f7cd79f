use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub type Fingerprint = u64;

const CHUNK_SIZE: usize = 64 * 1024;

/// Whole-file content hash, truncated to 64 bits.
pub fn fingerprint(path: &Path) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    fingerprint_reader(&mut file)
}

pub fn fingerprint_reader<R: Read>(reader: &mut R) -> io::Result<Fingerprint> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buf[..read]);
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    Ok(u64::from_le_bytes(head))
}
