//! Input events from the display's two encoders

/// One decoded input event
///
/// The upper encoder belongs to the iron, the lower one to the gun; the
/// direction already honours the per-encoder direction flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputEvent {
    UpperCw,
    UpperCcw,
    UpperClick,
    UpperLong,
    LowerCw,
    LowerCcw,
    LowerClick,
    LowerLong,
}

const EV_UPPER_CW: u8 = 0x01;
const EV_UPPER_CCW: u8 = 0x02;
const EV_UPPER_CLICK: u8 = 0x03;
const EV_UPPER_LONG: u8 = 0x04;
const EV_LOWER_CW: u8 = 0x11;
const EV_LOWER_CCW: u8 = 0x12;
const EV_LOWER_CLICK: u8 = 0x13;
const EV_LOWER_LONG: u8 = 0x14;

impl InputEvent {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            EV_UPPER_CW => Some(InputEvent::UpperCw),
            EV_UPPER_CCW => Some(InputEvent::UpperCcw),
            EV_UPPER_CLICK => Some(InputEvent::UpperClick),
            EV_UPPER_LONG => Some(InputEvent::UpperLong),
            EV_LOWER_CW => Some(InputEvent::LowerCw),
            EV_LOWER_CCW => Some(InputEvent::LowerCcw),
            EV_LOWER_CLICK => Some(InputEvent::LowerClick),
            EV_LOWER_LONG => Some(InputEvent::LowerLong),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            InputEvent::UpperCw => EV_UPPER_CW,
            InputEvent::UpperCcw => EV_UPPER_CCW,
            InputEvent::UpperClick => EV_UPPER_CLICK,
            InputEvent::UpperLong => EV_UPPER_LONG,
            InputEvent::LowerCw => EV_LOWER_CW,
            InputEvent::LowerCcw => EV_LOWER_CCW,
            InputEvent::LowerClick => EV_LOWER_CLICK,
            InputEvent::LowerLong => EV_LOWER_LONG,
        }
    }

    /// From the upper (iron) encoder
    pub fn is_upper(self) -> bool {
        matches!(
            self,
            InputEvent::UpperCw | InputEvent::UpperCcw | InputEvent::UpperClick | InputEvent::UpperLong
        )
    }

    /// Rotation as a signed detent count
    pub fn rotation(self) -> i8 {
        match self {
            InputEvent::UpperCw | InputEvent::LowerCw => 1,
            InputEvent::UpperCcw | InputEvent::LowerCcw => -1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [InputEvent; 8] = [
        InputEvent::UpperCw,
        InputEvent::UpperCcw,
        InputEvent::UpperClick,
        InputEvent::UpperLong,
        InputEvent::LowerCw,
        InputEvent::LowerCcw,
        InputEvent::LowerClick,
        InputEvent::LowerLong,
    ];

    #[test]
    fn test_byte_round_trip() {
        for event in ALL {
            assert_eq!(InputEvent::from_byte(event.to_byte()), Some(event));
        }
        assert!(InputEvent::from_byte(0xFF).is_none());
    }

    #[test]
    fn test_classification() {
        assert!(InputEvent::UpperClick.is_upper());
        assert!(!InputEvent::LowerCw.is_upper());
        assert_eq!(InputEvent::UpperCw.rotation(), 1);
        assert_eq!(InputEvent::LowerCcw.rotation(), -1);
        assert_eq!(InputEvent::LowerLong.rotation(), 0);
    }
}
