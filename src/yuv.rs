//! Interop with [`yuvxyb`] frames.

use yuvxyb::{Pixel, Yuv};

use crate::error::{Error, Result};
use crate::picture::{Picture, Plane};

impl<T: Pixel> TryFrom<&Yuv<T>> for Picture {
    type Error = Error;

    /// Copies the three planes of a YUV frame, dropping any plane padding.
    ///
    /// # Errors
    /// - If the frame's bit depth is not supported
    fn try_from(yuv: &Yuv<T>) -> Result<Self> {
        let bit_depth = yuv.config().bit_depth;
        let planes = yuv
            .data()
            .iter()
            .map(|plane| {
                let (width, height) = (plane.cfg.width, plane.cfg.height);
                let mut data = Vec::with_capacity(width * height);
                for row in plane.rows_iter().take(height) {
                    for &p in row.iter().take(width) {
                        let v: u32 = p.into();
                        data.push(u16::try_from(v).map_err(|e| {
                            Error::InvalidPicture(format!("sample {v} does not fit 16 bits: {e}"))
                        })?);
                    }
                }
                Plane::from_vec(width, height, data)
            })
            .collect::<Result<Vec<_>>>()?;
        Picture::new(planes, bit_depth)
    }
}

#[cfg(test)]
mod tests {
    use yuvxyb::{ColorPrimaries, Frame, MatrixCoefficients, TransferCharacteristic, YuvConfig};

    use super::*;

    fn make_yuv(ss: (u8, u8), bit_depth: u8) -> Yuv<u8> {
        let y_dims = (64usize, 48usize);
        let uv_dims = (y_dims.0 >> ss.0, y_dims.1 >> ss.1);
        let mut data: Frame<u8> = Frame {
            planes: [
                yuvxyb::Plane::new(y_dims.0, y_dims.1, 0, 0, 0, 0),
                yuvxyb::Plane::new(uv_dims.0, uv_dims.1, ss.0.into(), ss.1.into(), 0, 0),
                yuvxyb::Plane::new(uv_dims.0, uv_dims.1, ss.0.into(), ss.1.into(), 0, 0),
            ],
        };
        for (i, plane) in data.planes.iter_mut().enumerate() {
            for (j, val) in plane.data_origin_mut().iter_mut().enumerate() {
                *val = (16 + (i * 7 + j) % 200) as u8;
            }
        }
        Yuv::new(
            data,
            YuvConfig {
                bit_depth,
                subsampling_x: ss.0,
                subsampling_y: ss.1,
                full_range: false,
                matrix_coefficients: MatrixCoefficients::BT709,
                transfer_characteristics: TransferCharacteristic::BT1886,
                color_primaries: ColorPrimaries::BT709,
            },
        )
        .unwrap()
    }

    #[test]
    fn planes_keep_their_subsampled_size() {
        let picture = Picture::try_from(&make_yuv((1, 1), 8)).unwrap();
        assert_eq!(picture.num_planes(), 3);
        assert_eq!(picture.bit_depth(), 8);
        assert_eq!((picture.width(), picture.height()), (64, 48));
        assert_eq!((picture.plane(1).width(), picture.plane(1).height()), (32, 24));
        assert_eq!(picture.subsampling(2), (2, 2));
        assert_eq!(picture.plane(0).get(0, 0), 16);
        assert_eq!(picture.plane(1).get(1, 0), 24);
    }

    #[test]
    fn unsupported_bit_depth_is_rejected() {
        let err = Picture::try_from(&make_yuv((1, 1), 7)).unwrap_err();
        assert!(matches!(err, Error::InvalidPicture(_)));
    }
}
