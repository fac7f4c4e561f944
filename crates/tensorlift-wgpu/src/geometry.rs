//! Pooling geometry resolution.
//!
//! Turns an NHWC input shape plus operation attributes into the effective
//! window geometry a compute pass needs: output spatial size, pad offsets,
//! and the dilation-expanded filter extent. Pure arithmetic, no device state.

use tensorlift_api::{KernelError, PadMode};

pub const POOL_INPUT_RANK: usize = 4;

/// Effective pooling geometry, derived once per dispatch and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolGeometry {
    pub batch: usize,
    pub channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub filter_h: usize,
    pub filter_w: usize,
    pub effective_filter_h: usize,
    pub effective_filter_w: usize,
    pub out_h: usize,
    pub out_w: usize,
}

impl PoolGeometry {
    pub fn out_shape(&self) -> [usize; 4] {
        [self.batch, self.out_h, self.out_w, self.channels]
    }

    pub fn out_elements(&self) -> usize {
        self.batch * self.out_h * self.out_w * self.channels
    }

    pub fn in_elements(&self) -> usize {
        self.batch * self.in_h * self.in_w * self.channels
    }
}

fn effective_extent(filter: usize, dilation: usize) -> usize {
    if filter == 0 {
        0
    } else {
        (filter - 1) * dilation + 1
    }
}

fn valid_out(input: usize, effective: usize, stride: usize) -> usize {
    // ceil((input - effective + 1) / stride), zero when the window never fits
    if input < effective {
        0
    } else {
        (input - effective) / stride + 1
    }
}

fn same_out(input: usize, stride: usize) -> usize {
    input.div_ceil(stride)
}

fn same_pad_total(input: usize, effective: usize, stride: usize, out: usize) -> usize {
    if out == 0 {
        return 0;
    }
    ((out - 1) * stride + effective).saturating_sub(input)
}

fn explicit_out(input: usize, before: usize, after: usize, effective: usize, stride: usize) -> usize {
    let padded = input + before + after;
    if padded < effective {
        0
    } else {
        (padded - effective) / stride + 1
    }
}

/// Resolve the pooling geometry for a rank-4 NHWC input.
///
/// Fails with [`KernelError::InvalidRank`] when the input is not rank 4, and
/// with [`KernelError::InvalidStrideDilation`] when strides and dilation are
/// both greater than 1 in some spatial dimension; the compute path requires
/// at least one of the two to be unit per dimension.
pub fn resolve(
    input_shape: &[usize],
    filter: [usize; 2],
    strides: [usize; 2],
    pad: PadMode,
    dilation: [usize; 2],
) -> Result<PoolGeometry, KernelError> {
    if input_shape.len() != POOL_INPUT_RANK {
        return Err(KernelError::InvalidRank {
            expected: POOL_INPUT_RANK,
            actual: input_shape.len(),
        });
    }
    if (strides[0] > 1 && dilation[0] > 1) || (strides[1] > 1 && dilation[1] > 1) {
        return Err(KernelError::InvalidStrideDilation {
            stride_h: strides[0],
            stride_w: strides[1],
            dilation_h: dilation[0],
            dilation_w: dilation[1],
        });
    }

    let [batch, in_h, in_w, channels] = [
        input_shape[0],
        input_shape[1],
        input_shape[2],
        input_shape[3],
    ];
    let stride_h = strides[0].max(1);
    let stride_w = strides[1].max(1);
    let dilation_h = dilation[0].max(1);
    let dilation_w = dilation[1].max(1);
    let effective_filter_h = effective_extent(filter[0], dilation_h);
    let effective_filter_w = effective_extent(filter[1], dilation_w);

    let (out_h, out_w, pad_top, pad_left) = match pad {
        PadMode::Valid => (
            valid_out(in_h, effective_filter_h, stride_h),
            valid_out(in_w, effective_filter_w, stride_w),
            0,
            0,
        ),
        PadMode::Same => {
            let out_h = same_out(in_h, stride_h);
            let out_w = same_out(in_w, stride_w);
            let total_h = same_pad_total(in_h, effective_filter_h, stride_h, out_h);
            let total_w = same_pad_total(in_w, effective_filter_w, stride_w, out_w);
            (out_h, out_w, total_h / 2, total_w / 2)
        }
        PadMode::Explicit {
            top,
            bottom,
            left,
            right,
        } => (
            explicit_out(in_h, top, bottom, effective_filter_h, stride_h),
            explicit_out(in_w, left, right, effective_filter_w, stride_w),
            top,
            left,
        ),
    };

    Ok(PoolGeometry {
        batch,
        channels,
        in_h,
        in_w,
        stride_h,
        stride_w,
        pad_top,
        pad_left,
        dilation_h,
        dilation_w,
        filter_h: filter[0],
        filter_w: filter[1],
        effective_filter_h,
        effective_filter_w,
        out_h,
        out_w,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_pad_matches_convolution_formula() {
        let geom = resolve(&[1, 4, 4, 1], [2, 2], [2, 2], PadMode::Valid, [1, 1]).expect("resolve");
        assert_eq!(geom.out_shape(), [1, 2, 2, 1]);
        assert_eq!(geom.pad_top, 0);
        assert_eq!(geom.pad_left, 0);
        assert_eq!(geom.effective_filter_h, 2);

        let geom = resolve(&[2, 7, 5, 3], [3, 2], [2, 2], PadMode::Valid, [1, 1]).expect("resolve");
        // (7 - 3) / 2 + 1 = 3, (5 - 2) / 2 + 1 = 2
        assert_eq!(geom.out_shape(), [2, 3, 2, 3]);
    }

    #[test]
    fn same_pad_preserves_ceil_of_input_over_stride() {
        let geom = resolve(&[1, 5, 5, 1], [3, 3], [2, 2], PadMode::Same, [1, 1]).expect("resolve");
        assert_eq!(geom.out_h, 3);
        assert_eq!(geom.out_w, 3);
        // total pad = (3 - 1) * 2 + 3 - 5 = 2, split 1 / 1
        assert_eq!(geom.pad_top, 1);
        assert_eq!(geom.pad_left, 1);

        let geom = resolve(&[1, 4, 4, 1], [2, 2], [1, 1], PadMode::Same, [1, 1]).expect("resolve");
        assert_eq!(geom.out_shape(), [1, 4, 4, 1]);
        // total pad = 1, floor split puts the extra cell on the bottom/right
        assert_eq!(geom.pad_top, 0);
    }

    #[test]
    fn explicit_pad_enters_the_output_formula() {
        let pad = PadMode::Explicit {
            top: 1,
            bottom: 1,
            left: 0,
            right: 0,
        };
        let geom = resolve(&[1, 4, 4, 1], [3, 3], [1, 1], pad, [1, 1]).expect("resolve");
        // (4 + 2 - 3) / 1 + 1 = 4, (4 + 0 - 3) / 1 + 1 = 2
        assert_eq!(geom.out_h, 4);
        assert_eq!(geom.out_w, 2);
        assert_eq!(geom.pad_top, 1);
        assert_eq!(geom.pad_left, 0);
    }

    #[test]
    fn dilation_expands_the_effective_filter() {
        let geom = resolve(&[1, 7, 7, 1], [3, 3], [1, 1], PadMode::Valid, [2, 2]).expect("resolve");
        assert_eq!(geom.effective_filter_h, 5);
        assert_eq!(geom.effective_filter_w, 5);
        assert_eq!(geom.out_h, 3);
    }

    #[test]
    fn rank_mismatch_is_rejected() {
        let err = resolve(&[4, 4, 1], [2, 2], [2, 2], PadMode::Valid, [1, 1]).unwrap_err();
        assert!(matches!(
            err,
            KernelError::InvalidRank {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn simultaneous_stride_and_dilation_is_rejected_per_dimension() {
        let err = resolve(&[1, 4, 4, 1], [2, 2], [2, 2], PadMode::Valid, [2, 1]).unwrap_err();
        assert!(matches!(err, KernelError::InvalidStrideDilation { .. }));

        // unit stride in the dilated dimension is allowed
        resolve(&[1, 8, 8, 1], [2, 2], [1, 2], PadMode::Valid, [2, 1]).expect("resolve");
    }

    #[test]
    fn resolution_is_deterministic() {
        let a = resolve(&[2, 9, 9, 4], [3, 3], [2, 2], PadMode::Same, [1, 1]).expect("resolve");
        let b = resolve(&[2, 9, 9, 4], [3, 3], [2, 2], PadMode::Same, [1, 1]).expect("resolve");
        assert_eq!(a, b);
    }

    #[test]
    fn window_larger_than_input_yields_empty_output() {
        let geom = resolve(&[1, 2, 2, 1], [4, 4], [1, 1], PadMode::Valid, [1, 1]).expect("resolve");
        assert_eq!(geom.out_h, 0);
        assert_eq!(geom.out_elements(), 0);
    }
}
