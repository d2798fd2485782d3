//! Fixed-width binary encoding of point sequences.
//!
//! Wire format: `[x: f32 LE][y: f32 LE]` repeated once per point. There is no
//! header, length prefix or terminator; the transport's message framing is
//! the only boundary.

use crate::error::SyncError;
use crate::point::Point;

/// Encoded size of one point.
pub const POINT_SIZE: usize = 8;

/// Encode `points` into exactly `points.len() * 8` bytes.
pub fn encode(points: &[Point]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(points.len() * POINT_SIZE);
    for p in points {
        buf.extend_from_slice(&p.x.to_le_bytes());
        buf.extend_from_slice(&p.y.to_le_bytes());
    }
    buf
}

/// Decode a payload produced by [`encode`].
///
/// Fails with [`SyncError::MalformedPayload`] when the length is not a whole
/// number of points. The empty payload decodes to no points.
pub fn decode(payload: &[u8]) -> Result<Vec<Point>, SyncError> {
    if payload.len() % POINT_SIZE != 0 {
        return Err(SyncError::MalformedPayload { len: payload.len() });
    }

    Ok(payload
        .chunks_exact(POINT_SIZE)
        .map(|chunk| {
            let (x, y) = chunk.split_at(4);
            Point::new(f32_le(x), f32_le(y))
        })
        .collect())
}

fn f32_le(bytes: &[u8]) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    f32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sequence_is_zero_bytes() {
        assert!(encode(&[]).is_empty());
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn layout_is_x_then_y_little_endian() {
        let bytes = encode(&[Point::new(1.0, -2.5)]);
        assert_eq!(bytes.len(), POINT_SIZE);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..], &(-2.5f32).to_le_bytes());
    }

    #[test]
    fn three_point_stroke_is_24_bytes() {
        let stroke = [
            Point::new(10.0, 10.0),
            Point::new(15.0, 10.0),
            Point::new(20.0, 12.5),
        ];
        let bytes = encode(&stroke);
        assert_eq!(bytes.len(), 24);
        assert_eq!(decode(&bytes).unwrap(), stroke);
    }

    #[test]
    fn torn_payload_is_rejected() {
        let mut bytes = encode(&[Point::new(1.0, 1.0), Point::new(2.0, 2.0)]);
        bytes.pop();
        match decode(&bytes) {
            Err(SyncError::MalformedPayload { len }) => assert_eq!(len, 15),
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
    }

    #[test]
    fn payload_shorter_than_one_point_is_rejected() {
        assert!(matches!(
            decode(&[0u8; 3]),
            Err(SyncError::MalformedPayload { len: 3 })
        ));
    }
}
