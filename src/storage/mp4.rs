//! Minimal ISO-BMFF reader for the movie header duration.

const BOX_HEADER: usize = 8;

/// Duration in seconds from `moov/mvhd`, if the bytes carry one.
pub fn mvhd_duration_seconds(bytes: &[u8]) -> Option<f64> {
    let moov = find_box(bytes, b"moov")?;
    let mvhd = find_box(moov, b"mvhd")?;

    let version = *mvhd.first()?;
    let (timescale, duration) = match version {
        0 => (read_u32(mvhd, 12)? as u64, read_u32(mvhd, 16)? as u64),
        1 => (read_u32(mvhd, 20)? as u64, read_u64(mvhd, 24)?),
        _ => return None,
    };

    if timescale == 0 || duration == u32::MAX as u64 || duration == u64::MAX {
        return None;
    }
    Some(duration as f64 / timescale as f64)
}

/// Payload of the first child box named `kind`.
fn find_box<'a>(mut data: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
    while data.len() >= BOX_HEADER {
        let size32 = read_u32(data, 0)? as u64;
        let name = &data[4..8];

        let (header, size) = match size32 {
            0 => (BOX_HEADER, data.len() as u64),
            1 => (BOX_HEADER + 8, read_u64(data, 8)?),
            n => (BOX_HEADER, n),
        };

        let size = usize::try_from(size).ok()?;
        if size < header || size > data.len() {
            return None;
        }

        if name == kind {
            return Some(&data[header..size]);
        }
        data = &data[size..];
    }
    None
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}

#[cfg(test)]
pub(crate) fn test_movie(timescale: u32, duration: u32) -> Vec<u8> {
    fn boxed(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out
    }

    let mut mvhd = vec![0u8; 4]; // version 0, no flags
    mvhd.extend_from_slice(&0u32.to_be_bytes());
    mvhd.extend_from_slice(&0u32.to_be_bytes());
    mvhd.extend_from_slice(&timescale.to_be_bytes());
    mvhd.extend_from_slice(&duration.to_be_bytes());
    mvhd.extend_from_slice(&[0u8; 80]);

    let mut movie = boxed(b"ftyp", b"isomiso2mp41");
    movie.extend(boxed(b"free", &[0u8; 16]));
    movie.extend(boxed(b"moov", &boxed(b"mvhd", &mvhd)));
    movie.extend(boxed(b"mdat", &[7u8; 64]));
    movie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_version0_duration() {
        assert_eq!(mvhd_duration_seconds(&test_movie(1000, 5200)), Some(5.2));
        assert_eq!(mvhd_duration_seconds(&test_movie(16, 80)), Some(5.0));
    }

    #[test]
    fn test_non_movie_bytes() {
        assert_eq!(mvhd_duration_seconds(b""), None);
        assert_eq!(mvhd_duration_seconds(b"\x00\x00\x00\x18ftypmp42fake-video-bytes"), None);
        assert_eq!(mvhd_duration_seconds(&test_movie(0, 100)), None);
    }

    #[test]
    fn test_truncated_box_is_rejected() {
        let mut movie = test_movie(1000, 5000);
        // cut inside moov
        movie.truncate(movie.len() - 120);
        assert_eq!(mvhd_duration_seconds(&movie), None);
    }
}
