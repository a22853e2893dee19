use crate::raster::request::RenderRequest;

/// Builds the column→first-sample index for sparse captures.
///
/// Entry `col` is the last sample whose x lies before `col`, so a segment
/// that starts left of the column and reaches into it is still visited.
/// `ticks` must be sorted.
pub fn build_column_index(ticks: &[i64], req: &RenderRequest) -> Vec<u32> {
    let x_of = |tick: i64| tick.wrapping_add(req.inner_xoff) as f64 * req.xscale as f64 + req.xoff as f64;
    (0..req.width())
        .map(|col| {
            let first_at_or_after = ticks.partition_point(|&t| x_of(t) < col as f64);
            first_at_or_after.saturating_sub(1).min(u32::MAX as usize) as u32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_points_at_segment_entering_column() {
        let req = RenderRequest {
            window_width: 6,
            xscale: 0.5,
            ..RenderRequest::default()
        };
        // x = 0, 1, 1.5, 4
        let ticks = [0, 2, 3, 8];
        assert_eq!(build_column_index(&ticks, &req), vec![0, 0, 2, 2, 2, 3]);
    }

    #[test]
    fn index_honours_time_origin_shift() {
        let req = RenderRequest {
            window_width: 3,
            inner_xoff: -1_000,
            ..RenderRequest::default()
        };
        let ticks = [1_000, 1_001, 1_002];
        assert_eq!(build_column_index(&ticks, &req), vec![0, 0, 1]);
        assert!(build_column_index(&[], &req).iter().all(|&i| i == 0));
    }
}
