//! Camera feed selection from relative pose
//!
//! Every function here is pure. Angles are in degrees.

/// Normalize an angle into `[0, 360)`
pub fn normalize_degrees(angle: f64) -> f64 {
    let normalized = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Angle under which the viewer sees the peer, in the peer's own frame
///
/// `viewer` and `peer` are `(x, y)` positions; `peer_yaw` is the peer's yaw.
pub fn viewing_angle(viewer: (f64, f64), peer: (f64, f64), peer_yaw: f64) -> f64 {
    let (mx, my) = viewer;
    let (px, py) = peer;
    let bearing = (my - py).atan2(mx - px).to_degrees();
    normalize_degrees(bearing - 90.0 + peer_yaw)
}

/// Sector of `angle` among `feed_count` equal sectors
///
/// Sector 0 is centred on 90 degrees. A boundary angle belongs to the sector
/// that starts at it. Returns `None` when there are no feeds.
pub fn select_sector(angle: f64, feed_count: usize) -> Option<usize> {
    if feed_count == 0 {
        return None;
    }
    let width = 360.0 / feed_count as f64;
    let offset = width / 2.0 - 90.0;
    let index = (normalize_degrees(angle - offset) / width).floor();
    Some((index.max(0.0) as usize).min(feed_count - 1))
}

/// Index of the feed the viewer should display for the peer
pub fn select_feed_index(
    viewer: (f64, f64),
    peer: (f64, f64),
    peer_yaw: f64,
    feed_count: usize,
) -> Option<usize> {
    select_sector(viewing_angle(viewer, peer, peer_yaw), feed_count)
}
