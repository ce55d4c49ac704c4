//! # Property identifiers
//!
//! One closed set of identifiers for both capture and writer handles. Each
//! identifier resolves to a fixed backend numeric code; the codes are an
//! internal detail and never cross the handle API.

use std::fmt;
use std::str::FromStr;

use crate::error::UnknownProperty;

/// Which kind of handle a property belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyScope {
    Capture,
    Writer,
}

macro_rules! property_table {
    ($( $scope:ident $variant:ident = $code:literal, $name:literal; )*) => {
        /// Capture and writer property identifiers
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PropertyId {
            $( $variant, )*
        }

        impl PropertyId {
            /// Every identifier, in table order
            pub const ALL: &'static [PropertyId] = &[ $( PropertyId::$variant, )* ];

            /// Backend numeric code for this identifier
            pub const fn resolve(self) -> i32 {
                match self {
                    $( PropertyId::$variant => $code, )*
                }
            }

            pub const fn scope(self) -> PropertyScope {
                match self {
                    $( PropertyId::$variant => PropertyScope::$scope, )*
                }
            }

            /// Kebab-case name, as accepted by [`FromStr`]
            pub const fn name(self) -> &'static str {
                match self {
                    $( PropertyId::$variant => $name, )*
                }
            }
        }
    };
}

property_table! {
    Capture PosMsec = 0, "pos-msec";
    Capture PosFrames = 1, "pos-frames";
    Capture PosAviRatio = 2, "pos-avi-ratio";
    Capture FrameWidth = 3, "frame-width";
    Capture FrameHeight = 4, "frame-height";
    Capture Fps = 5, "fps";
    Capture Fourcc = 6, "fourcc";
    Capture FrameCount = 7, "frame-count";
    Capture Format = 8, "format";
    Capture Mode = 9, "mode";
    Capture Brightness = 10, "brightness";
    Capture Contrast = 11, "contrast";
    Capture Saturation = 12, "saturation";
    Capture Hue = 13, "hue";
    Capture Gain = 14, "gain";
    Capture Exposure = 15, "exposure";
    Capture ConvertRgb = 16, "convert-rgb";
    Capture WhiteBalanceBlueU = 17, "white-balance-blue-u";
    Capture Rectification = 18, "rectification";
    Capture Monochrome = 19, "monochrome";
    Capture Sharpness = 20, "sharpness";
    Capture AutoExposure = 21, "auto-exposure";
    Capture Gamma = 22, "gamma";
    Capture Temperature = 23, "temperature";
    Capture Trigger = 24, "trigger";
    Capture TriggerDelay = 25, "trigger-delay";
    Capture WhiteBalanceRedV = 26, "white-balance-red-v";
    Capture Zoom = 27, "zoom";
    Capture Focus = 28, "focus";
    Capture Guid = 29, "guid";
    Capture IsoSpeed = 30, "iso-speed";
    Capture Backlight = 32, "backlight";
    Capture Pan = 33, "pan";
    Capture Tilt = 34, "tilt";
    Capture Roll = 35, "roll";
    Capture Iris = 36, "iris";
    Capture Settings = 37, "settings";
    Capture BufferSize = 38, "buffer-size";
    Capture AutoFocus = 39, "auto-focus";
    Writer Quality = 1, "quality";
    Writer FrameBytes = 2, "frame-bytes";
    Writer NStripes = 3, "nstripes";
    Writer IsColor = 4, "is-color";
}

/// Backend numeric code for `id`
pub const fn resolve(id: PropertyId) -> i32 {
    id.resolve()
}

impl PropertyId {
    pub fn is_capture(self) -> bool {
        self.scope() == PropertyScope::Capture
    }

    pub fn is_writer(self) -> bool {
        self.scope() == PropertyScope::Writer
    }

    /// Identifiers of one scope, in table order
    pub fn in_scope(scope: PropertyScope) -> impl Iterator<Item = PropertyId> {
        Self::ALL.iter().copied().filter(move |id| id.scope() == scope)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PropertyId {
    type Err = UnknownProperty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.name() == wanted)
            .ok_or_else(|| UnknownProperty(s.to_string()))
    }
}
