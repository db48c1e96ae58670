//! Slicing a source file into conjoined work units

use crate::error::{NimbusError, Result};
use crate::storage::ConjoinedSession;

/// One byte range of the source file, archived as one conjoined part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub collection: String,
    pub key: String,
    pub conjoined_identifier: String,
    pub conjoined_part: u32,
    pub offset: u64,
    pub size: u64,
}

/// Number of parts `file_size` bytes split into at `slice_size` bytes per part.
///
/// An empty file still takes one part. Fails if the count does not fit a part
/// index or `slice_size` is zero.
pub fn part_count(file_size: u64, slice_size: u64) -> Result<u32> {
    if slice_size == 0 {
        return Err(NimbusError::InvalidConfig {
            reason: "slice_size must be at least 1 byte".into(),
        });
    }
    let count = file_size.div_ceil(slice_size).max(1);
    u32::try_from(count).map_err(|_| NimbusError::InvalidConfig {
        reason: format!(
            "{} bytes at slice_size {} needs {} parts, more than {} allowed",
            file_size,
            slice_size,
            count,
            u32::MAX
        ),
    })
}

/// Split `file_size` bytes into consecutive slices of `slice_size` bytes.
///
/// Parts are numbered from zero in file order; the last slice may be shorter.
/// An empty file yields one zero-length part.
pub fn partition(
    session: &ConjoinedSession,
    file_size: u64,
    slice_size: u64,
) -> Result<Vec<WorkUnit>> {
    let count = part_count(file_size, slice_size)?;

    let unit = |conjoined_part: u32, offset: u64, size: u64| WorkUnit {
        collection: session.collection_name().to_string(),
        key: session.key().to_string(),
        conjoined_identifier: session.conjoined_identifier().to_string(),
        conjoined_part,
        offset,
        size,
    };

    if file_size == 0 {
        return Ok(vec![unit(0, 0, 0)]);
    }

    Ok((0..count)
        .map(|index| {
            let offset = u64::from(index) * slice_size;
            let size = slice_size.min(file_size - offset);
            unit(index, offset, size)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ConjoinedSession {
        ConjoinedSession::resume("photos", "movie.mkv", "abc123")
    }

    #[test]
    fn test_even_split() {
        let units = partition(&session(), 2000, 1000).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!((units[0].offset, units[0].size), (0, 1000));
        assert_eq!((units[1].offset, units[1].size), (1000, 1000));
        assert_eq!(units[1].conjoined_part, 1);
        assert!(units.iter().all(|u| u.conjoined_identifier == "abc123"));
    }

    #[test]
    fn test_short_tail() {
        let units = partition(&session(), 2500, 1000).unwrap();
        assert_eq!(units.len(), 3);
        assert_eq!((units[2].offset, units[2].size), (2000, 500));
        assert_eq!(units.iter().map(|u| u.size).sum::<u64>(), 2500);
    }

    #[test]
    fn test_slice_larger_than_file() {
        let units = partition(&session(), 10, 1000).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].size, 10);
    }

    #[test]
    fn test_empty_file() {
        let units = partition(&session(), 0, 1000).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!((units[0].offset, units[0].size), (0, 0));
    }

    #[test]
    fn test_part_count_limits() {
        assert_eq!(part_count(0, 1000).unwrap(), 1);
        assert_eq!(part_count(1001, 1000).unwrap(), 2);
        assert_eq!(part_count(u64::from(u32::MAX), 1).unwrap(), u32::MAX);
        assert!(matches!(
            part_count(u64::from(u32::MAX) + 1, 1),
            Err(NimbusError::InvalidConfig { .. })
        ));
        assert!(part_count(10, 0).is_err());
    }

    #[test]
    fn test_too_many_parts_rejected() {
        let result = partition(&session(), 5 * 1024 * 1024 * 1024, 1);
        assert!(matches!(result, Err(NimbusError::InvalidConfig { .. })));
    }
}
