//! Host reference implementations of the pooling kernels.
//!
//! Element-for-element mirrors of the generated shaders, used as the oracle
//! in tests and as the fallback when no adapter is available. Any change to
//! the shader scan order or tie-breaking must land here as well.

use crate::geometry::PoolGeometry;

fn input_offset(geom: &PoolGeometry, b: usize, h: usize, w: usize, c: usize) -> usize {
    ((b * geom.in_h + h) * geom.in_w + w) * geom.channels + c
}

/// Max pool with flattened argmax offsets. Window cells are scanned in
/// row-major order and ties keep the first maximum, matching the shader's
/// strictly-greater compare. Padding cells never participate.
pub fn max_pool_with_argmax(
    input: &[f32],
    geom: &PoolGeometry,
    include_batch: bool,
) -> (Vec<f32>, Vec<i32>) {
    let n = geom.out_elements();
    let mut values = vec![0.0f32; n];
    let mut indices = vec![0i32; n];

    let mut out = 0usize;
    for b in 0..geom.batch {
        for oh in 0..geom.out_h {
            for ow in 0..geom.out_w {
                for c in 0..geom.channels {
                    let h_start = (oh * geom.stride_h) as isize - geom.pad_top as isize;
                    let w_start = (ow * geom.stride_w) as isize - geom.pad_left as isize;
                    let mut best = f32::MIN;
                    let mut best_index = 0i32;
                    for wh in 0..geom.filter_h {
                        let h = h_start + (wh * geom.dilation_h) as isize;
                        if h < 0 || h as usize >= geom.in_h {
                            continue;
                        }
                        for ww in 0..geom.filter_w {
                            let w = w_start + (ww * geom.dilation_w) as isize;
                            if w < 0 || w as usize >= geom.in_w {
                                continue;
                            }
                            let (h, w) = (h as usize, w as usize);
                            let v = input[input_offset(geom, b, h, w, c)];
                            if v > best {
                                best = v;
                                best_index = if include_batch {
                                    input_offset(geom, b, h, w, c) as i32
                                } else {
                                    input_offset(geom, 0, h, w, c) as i32
                                };
                            }
                        }
                    }
                    values[out] = best;
                    indices[out] = best_index;
                    out += 1;
                }
            }
        }
    }
    (values, indices)
}

/// Mean pool over in-bounds window cells. The divisor counts only cells that
/// fall inside the input, so edge windows shrunk by padding average over
/// fewer cells.
pub fn avg_pool(input: &[f32], geom: &PoolGeometry) -> Vec<f32> {
    let n = geom.out_elements();
    let mut values = vec![0.0f32; n];

    let mut out = 0usize;
    for b in 0..geom.batch {
        for oh in 0..geom.out_h {
            for ow in 0..geom.out_w {
                for c in 0..geom.channels {
                    let h_start = (oh * geom.stride_h) as isize - geom.pad_top as isize;
                    let w_start = (ow * geom.stride_w) as isize - geom.pad_left as isize;
                    let mut sum = 0.0f32;
                    let mut count = 0usize;
                    for wh in 0..geom.filter_h {
                        let h = h_start + (wh * geom.dilation_h) as isize;
                        if h < 0 || h as usize >= geom.in_h {
                            continue;
                        }
                        for ww in 0..geom.filter_w {
                            let w = w_start + (ww * geom.dilation_w) as isize;
                            if w < 0 || w as usize >= geom.in_w {
                                continue;
                            }
                            sum += input[input_offset(geom, b, h as usize, w as usize, c)];
                            count += 1;
                        }
                    }
                    values[out] = if count > 0 { sum / count as f32 } else { 0.0 };
                    out += 1;
                }
            }
        }
    }
    values
}
