// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer property and composition-type enums.

/// How a layer's pixels combine with what lies beneath it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Opaque; the alpha channel is ignored.
    None,
    /// Source color is premultiplied by its alpha.
    #[default]
    Premultiplied,
    /// Source color is multiplied by its alpha while blending.
    Coverage,
}

/// Rotation and flip applied to a layer's source before display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LayerTransform {
    /// No transform.
    #[default]
    Identity,
    /// Horizontal flip.
    FlipH,
    /// Vertical flip.
    FlipV,
    /// 90° clockwise rotation.
    Rot90,
    /// 180° rotation.
    Rot180,
    /// 270° clockwise rotation.
    Rot270,
    /// Horizontal flip followed by a 90° rotation.
    FlipHRot90,
    /// Vertical flip followed by a 90° rotation.
    FlipVRot90,
}

impl LayerTransform {
    /// Returns `true` if the transform swaps width and height.
    #[must_use]
    pub const fn is_rotated(self) -> bool {
        matches!(
            self,
            Self::Rot90 | Self::Rot270 | Self::FlipHRot90 | Self::FlipVRot90
        )
    }
}

/// Color-space tag of a layer's buffer.
///
/// The value is opaque to the core; colour pipelines are external.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dataspace(pub u32);

impl Dataspace {
    /// Unspecified color space.
    pub const UNKNOWN: Self = Self(0);
}

/// Pixel layout of a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[expect(missing_docs, reason = "format names are self-describing")]
pub enum PixelFormat {
    #[default]
    Rgba8888,
    Rgbx8888,
    Bgra8888,
    Rgb565,
    Rgba1010102,
    RgbaFp16,
    Nv12,
    Nv21,
    Yv12,
    P010,
}

impl PixelFormat {
    /// Returns `true` for YUV (video/camera) formats.
    #[must_use]
    pub const fn is_yuv(self) -> bool {
        matches!(self, Self::Nv12 | Self::Nv21 | Self::Yv12 | Self::P010)
    }
}

/// Per-layer content flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LayerFlags {
    /// DRM-protected content.
    pub protected: bool,
    /// High dynamic range content.
    pub hdr: bool,
}

/// Static HDR metadata supplied per frame.
///
/// Coefficient computation is done by the backend; the core only stores the
/// values and reports them as content changes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HdrMetadata {
    /// Mastering display maximum luminance, in nits.
    pub max_luminance: f32,
    /// Mastering display minimum luminance, in nits.
    pub min_luminance: f32,
    /// Maximum content light level, in nits.
    pub max_content_light_level: f32,
    /// Maximum frame-average light level, in nits.
    pub max_frame_average_light_level: f32,
}

/// Overlay priority of a layer.
///
/// Elevated layers are never demoted by the sandwich rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OverlayPriority {
    /// Ordinary layer.
    #[default]
    Normal,
    /// Keep on a dedicated window whenever possible.
    Elevated,
}

/// The composition type the host asked for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RequestedComposition {
    /// The host renders the layer into the client target.
    Client,
    /// Scan out directly on a hardware window.
    #[default]
    Device,
    /// A constant color fill, no buffer.
    SolidColor,
    /// A cursor layer that may move asynchronously.
    Cursor,
}

/// The composition path chosen by the assigner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Composition {
    /// Rendered by the host into the client target.
    #[default]
    Client,
    /// Direct hardware overlay.
    Device,
    /// Blended by the secondary hardware unit into its own target.
    Secondary,
}

impl Composition {
    /// The type the host sees for this path. Secondary composition is
    /// hardware work, so the host sees it as Device.
    #[must_use]
    pub const fn host_visible(self) -> HostComposition {
        match self {
            Self::Client => HostComposition::Client,
            Self::Device | Self::Secondary => HostComposition::Device,
        }
    }
}

/// A composition type as reported to the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HostComposition {
    /// The host must render the layer into the client target.
    Client,
    /// The hardware handles the layer.
    #[default]
    Device,
}

impl From<RequestedComposition> for HostComposition {
    fn from(requested: RequestedComposition) -> Self {
        match requested {
            RequestedComposition::Client => Self::Client,
            RequestedComposition::Device
            | RequestedComposition::SolidColor
            | RequestedComposition::Cursor => Self::Device,
        }
    }
}

/// A per-layer request returned from validate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerRequest {
    /// The host should clear the client target to transparent where this
    /// layer lies, so the hardware layer beneath shows through.
    ClearClientTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuv_formats() {
        assert!(PixelFormat::Nv12.is_yuv());
        assert!(PixelFormat::P010.is_yuv());
        assert!(!PixelFormat::Rgba8888.is_yuv());
        assert!(!PixelFormat::RgbaFp16.is_yuv());
    }

    #[test]
    fn secondary_is_device_to_the_host() {
        assert_eq!(Composition::Secondary.host_visible(), HostComposition::Device);
        assert_eq!(Composition::Client.host_visible(), HostComposition::Client);
        assert_eq!(
            HostComposition::from(RequestedComposition::Cursor),
            HostComposition::Device
        );
    }
}
