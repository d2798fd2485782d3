use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::point::Point;

/// The stroke buffer shared by the render loop and the networking tasks.
///
/// Cloning is cheap and yields another handle to the same buffer. Each
/// operation takes the lock once; there is no multi-operation transaction, so
/// a local append racing a remote replace resolves as last writer wins.
///
/// The lock is a blocking `std` lock: the render loop is synchronous and no
/// guard is ever held across an `.await`.
#[derive(Clone, Debug, Default)]
pub struct SharedDrawing {
    points: Arc<RwLock<Vec<Point>>>,
}

impl SharedDrawing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add points to the end of the buffer.
    pub fn append(&self, points: &[Point]) {
        if points.is_empty() {
            return;
        }
        self.write().extend_from_slice(points);
    }

    /// Swap in an entirely new buffer.
    pub fn replace(&self, points: Vec<Point>) {
        *self.write() = points;
    }

    /// Copy of the current buffer, taken under the read lock.
    pub fn snapshot(&self) -> Vec<Point> {
        self.read().clone()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Borrow the buffer for the duration of `f`, e.g. to render it without
    /// copying.
    pub fn with_points<R>(&self, f: impl FnOnce(&[Point]) -> R) -> R {
        f(&self.read())
    }

    // Writers only ever store whole `Point`s, so a poisoned lock still
    // guards a consistent buffer.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Point>> {
        self.points.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Point>> {
        self.points.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(n: usize) -> Vec<Point> {
        (0..n).map(|i| Point::new(i as f32, i as f32)).collect()
    }

    #[test]
    fn starts_empty() {
        let drawing = SharedDrawing::new();
        assert!(drawing.is_empty());
        assert!(drawing.snapshot().is_empty());
    }

    #[test]
    fn append_then_replace_then_clear() {
        let drawing = SharedDrawing::new();
        drawing.append(&pts(3));
        drawing.append(&pts(2));
        assert_eq!(drawing.len(), 5);

        drawing.replace(vec![Point::new(9.0, 9.0)]);
        assert_eq!(drawing.snapshot(), vec![Point::new(9.0, 9.0)]);

        drawing.clear();
        assert!(drawing.is_empty());
    }

    #[test]
    fn clones_share_the_buffer() {
        let a = SharedDrawing::new();
        let b = a.clone();
        a.append(&pts(4));
        assert_eq!(b.len(), 4);
        b.clear();
        assert!(a.is_empty());
    }

    #[test]
    fn snapshot_is_detached_copy() {
        let drawing = SharedDrawing::new();
        drawing.append(&pts(2));
        let snap = drawing.snapshot();
        drawing.clear();
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn with_points_borrows_in_place() {
        let drawing = SharedDrawing::new();
        drawing.append(&pts(3));
        let sum: f32 = drawing.with_points(|p| p.iter().map(|p| p.x).sum());
        assert_eq!(sum, 3.0);
    }

    #[test]
    fn survives_a_panicking_writer() {
        let drawing = SharedDrawing::new();
        drawing.append(&pts(1));
        let d = drawing.clone();
        let _ = std::thread::spawn(move || -> () {
            let _guard = d.write();
            panic!("boom");
        })
        .join();
        assert!(drawing.points.is_poisoned());
        drawing.append(&pts(1));
        assert_eq!(drawing.len(), 2);
    }

    #[test]
    fn concurrent_appends_and_snapshots_stay_consistent() {
        const WRITERS: usize = 4;
        const ROUNDS: usize = 200;
        // Every append writes a block of identical points; a snapshot must
        // only ever contain whole blocks.
        const BLOCK: usize = 8;

        let drawing = SharedDrawing::new();
        let mut handles = Vec::new();

        for w in 0..WRITERS {
            let d = drawing.clone();
            handles.push(std::thread::spawn(move || {
                let block = vec![Point::new(w as f32, -(w as f32)); BLOCK];
                for _ in 0..ROUNDS {
                    d.append(&block);
                }
            }));
        }

        for _ in 0..WRITERS {
            let d = drawing.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let snap = d.snapshot();
                    assert_eq!(snap.len() % BLOCK, 0);
                    for chunk in snap.chunks(BLOCK) {
                        assert!(chunk.iter().all(|p| *p == chunk[0]));
                        assert_eq!(chunk[0].x, -chunk[0].y);
                    }
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(drawing.len(), WRITERS * ROUNDS * BLOCK);
    }
}
