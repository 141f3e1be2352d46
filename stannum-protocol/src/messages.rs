//! Messages from the station to the display
//!
//! The station publishes state; the display renders it. Integers are
//! little-endian. The reverse direction carries only
//! [`crate::events::InputEvent`] bytes under [`MSG_INPUT`].

use heapless::{String, Vec};

use crate::frame::{Frame, FrameError, MAX_PAYLOAD};

/// Display → station: one input event byte
pub const MSG_INPUT: u8 = 0x01;

// Station → display
pub const MSG_PRESET_TEMP: u8 = 0x30;
pub const MSG_PHASE: u8 = 0x31;
pub const MSG_TEMP: u8 = 0x32;
pub const MSG_TEMP_GAUGE: u8 = 0x33;
pub const MSG_POWER: u8 = 0x34;
pub const MSG_FAN: u8 = 0x35;
pub const MSG_AMBIENT: u8 = 0x36;
pub const MSG_TIP_NAME: u8 = 0x37;
pub const MSG_FAN_ANIM: u8 = 0x38;
pub const MSG_TIME_TO_OFF: u8 = 0x39;
pub const MSG_ERROR: u8 = 0x3A;
pub const MSG_DIALOG: u8 = 0x3B;

/// Longest tip name shown on the display
pub const MAX_TIP_NAME: usize = 10;

/// Screen area a message applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayArea {
    /// The iron pane
    Upper = 0,
    /// The gun pane
    Lower = 1,
}

impl DisplayArea {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(DisplayArea::Upper),
            1 => Some(DisplayArea::Lower),
            _ => None,
        }
    }
}

/// Everything the station tells the display
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StationMessage {
    /// Preset temperature in display units
    PresetTemp { area: DisplayArea, temp: u16 },
    /// Working phase indicator (phase codes are display data)
    Phase { area: DisplayArea, phase: u8 },
    /// Measured temperature in display units
    Temp { area: DisplayArea, temp: u16 },
    /// Deviation bar: measured minus preset
    TempGauge { area: DisplayArea, delta: i16 },
    /// Applied power percentage
    Power { area: DisplayArea, pcnt: u8 },
    /// Fan percentage; `modifying` highlights the value while edited
    Fan { pcnt: u8, modifying: bool },
    /// Ambient temperature and the units flag
    Ambient { celsius: i16, is_celsius: bool },
    /// Current tip name with its calibration mark
    TipName {
        area: DisplayArea,
        calibrated: bool,
        name: String<MAX_TIP_NAME>,
    },
    /// Fan animation step, temperature delta colours it
    FanAnim { delta: i16 },
    /// Auto-off countdown, seconds
    TimeToOff { area: DisplayArea, seconds: u16 },
    /// Error screen with an optional numeric parameter
    Error { code: u8, param: Option<u16> },
    /// Yes/no dialog with the highlighted answer
    Dialog { code: u8, answer: bool },
}

impl StationMessage {
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let mut payload = Vec::<u8, MAX_PAYLOAD>::new();
        let push = |payload: &mut Vec<u8, MAX_PAYLOAD>, bytes: &[u8]| {
            payload
                .extend_from_slice(bytes)
                .map_err(|_| FrameError::TooLong)
        };
        let msg_type = match self {
            StationMessage::PresetTemp { area, temp } => {
                push(&mut payload, &[*area as u8])?;
                push(&mut payload, &temp.to_le_bytes())?;
                MSG_PRESET_TEMP
            }
            StationMessage::Phase { area, phase } => {
                push(&mut payload, &[*area as u8, *phase])?;
                MSG_PHASE
            }
            StationMessage::Temp { area, temp } => {
                push(&mut payload, &[*area as u8])?;
                push(&mut payload, &temp.to_le_bytes())?;
                MSG_TEMP
            }
            StationMessage::TempGauge { area, delta } => {
                push(&mut payload, &[*area as u8])?;
                push(&mut payload, &delta.to_le_bytes())?;
                MSG_TEMP_GAUGE
            }
            StationMessage::Power { area, pcnt } => {
                push(&mut payload, &[*area as u8, *pcnt])?;
                MSG_POWER
            }
            StationMessage::Fan { pcnt, modifying } => {
                push(&mut payload, &[*pcnt, *modifying as u8])?;
                MSG_FAN
            }
            StationMessage::Ambient {
                celsius,
                is_celsius,
            } => {
                push(&mut payload, &celsius.to_le_bytes())?;
                push(&mut payload, &[*is_celsius as u8])?;
                MSG_AMBIENT
            }
            StationMessage::TipName {
                area,
                calibrated,
                name,
            } => {
                push(&mut payload, &[*area as u8, *calibrated as u8])?;
                push(&mut payload, &[name.len() as u8])?;
                push(&mut payload, name.as_bytes())?;
                MSG_TIP_NAME
            }
            StationMessage::FanAnim { delta } => {
                push(&mut payload, &delta.to_le_bytes())?;
                MSG_FAN_ANIM
            }
            StationMessage::TimeToOff { area, seconds } => {
                push(&mut payload, &[*area as u8])?;
                push(&mut payload, &seconds.to_le_bytes())?;
                MSG_TIME_TO_OFF
            }
            StationMessage::Error { code, param } => {
                push(&mut payload, &[*code])?;
                if let Some(param) = param {
                    push(&mut payload, &param.to_le_bytes())?;
                }
                MSG_ERROR
            }
            StationMessage::Dialog { code, answer } => {
                push(&mut payload, &[*code, *answer as u8])?;
                MSG_DIALOG
            }
        };
        Frame::new(msg_type, &payload)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let p = &frame.payload;
        let area = |i: usize| -> Result<DisplayArea, FrameError> {
            p.get(i)
                .copied()
                .and_then(DisplayArea::from_byte)
                .ok_or(FrameError::Malformed)
        };
        let u16_at = |i: usize| -> Result<u16, FrameError> {
            match (p.get(i), p.get(i + 1)) {
                (Some(&lo), Some(&hi)) => Ok(u16::from_le_bytes([lo, hi])),
                _ => Err(FrameError::Malformed),
            }
        };
        let byte = |i: usize| -> Result<u8, FrameError> {
            p.get(i).copied().ok_or(FrameError::Malformed)
        };

        match frame.msg_type {
            MSG_PRESET_TEMP => Ok(StationMessage::PresetTemp {
                area: area(0)?,
                temp: u16_at(1)?,
            }),
            MSG_PHASE => Ok(StationMessage::Phase {
                area: area(0)?,
                phase: byte(1)?,
            }),
            MSG_TEMP => Ok(StationMessage::Temp {
                area: area(0)?,
                temp: u16_at(1)?,
            }),
            MSG_TEMP_GAUGE => Ok(StationMessage::TempGauge {
                area: area(0)?,
                delta: u16_at(1)? as i16,
            }),
            MSG_POWER => Ok(StationMessage::Power {
                area: area(0)?,
                pcnt: byte(1)?,
            }),
            MSG_FAN => Ok(StationMessage::Fan {
                pcnt: byte(0)?,
                modifying: byte(1)? != 0,
            }),
            MSG_AMBIENT => Ok(StationMessage::Ambient {
                celsius: u16_at(0)? as i16,
                is_celsius: byte(2)? != 0,
            }),
            MSG_TIP_NAME => {
                let len = byte(2)? as usize;
                if len > MAX_TIP_NAME || p.len() < 3 + len {
                    return Err(FrameError::Malformed);
                }
                let text =
                    core::str::from_utf8(&p[3..3 + len]).map_err(|_| FrameError::Malformed)?;
                let mut name = String::new();
                name.push_str(text).map_err(|_| FrameError::Malformed)?;
                Ok(StationMessage::TipName {
                    area: area(0)?,
                    calibrated: byte(1)? != 0,
                    name,
                })
            }
            MSG_FAN_ANIM => Ok(StationMessage::FanAnim {
                delta: u16_at(0)? as i16,
            }),
            MSG_TIME_TO_OFF => Ok(StationMessage::TimeToOff {
                area: area(0)?,
                seconds: u16_at(1)?,
            }),
            MSG_ERROR => Ok(StationMessage::Error {
                code: byte(0)?,
                param: if p.len() >= 3 { Some(u16_at(1)?) } else { None },
            }),
            MSG_DIALOG => Ok(StationMessage::Dialog {
                code: byte(0)?,
                answer: byte(1)? != 0,
            }),
            _ => Err(FrameError::Malformed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_round_trips() {
        let mut name = String::new();
        name.push_str("T12-BC2").unwrap();
        let messages = [
            StationMessage::PresetTemp {
                area: DisplayArea::Upper,
                temp: 300,
            },
            StationMessage::Phase {
                area: DisplayArea::Lower,
                phase: 3,
            },
            StationMessage::TempGauge {
                area: DisplayArea::Upper,
                delta: -25,
            },
            StationMessage::Fan {
                pcnt: 60,
                modifying: true,
            },
            StationMessage::Ambient {
                celsius: -5,
                is_celsius: true,
            },
            StationMessage::TipName {
                area: DisplayArea::Upper,
                calibrated: true,
                name,
            },
            StationMessage::TimeToOff {
                area: DisplayArea::Upper,
                seconds: 99,
            },
            StationMessage::Error {
                code: 4,
                param: Some(12),
            },
            StationMessage::Error {
                code: 4,
                param: None,
            },
            StationMessage::Dialog {
                code: 2,
                answer: false,
            },
        ];
        for message in messages {
            let frame = message.to_frame().unwrap();
            let back = StationMessage::from_frame(&frame).unwrap();
            assert_eq!(back, message);
        }
    }

    #[test]
    fn test_round_trip_through_the_wire() {
        let message = StationMessage::Temp {
            area: DisplayArea::Lower,
            temp: 356,
        };
        let bytes = message.to_frame().unwrap().encode();
        let mut parser = crate::frame::FrameParser::new();
        let frame = parser.feed_slice(&bytes).unwrap().unwrap();
        assert_eq!(StationMessage::from_frame(&frame).unwrap(), message);
    }

    #[test]
    fn test_malformed_frames_rejected() {
        let frame = Frame::new(MSG_PHASE, &[0]).unwrap(); // missing phase byte
        assert_eq!(
            StationMessage::from_frame(&frame),
            Err(FrameError::Malformed)
        );

        let frame = Frame::new(MSG_PRESET_TEMP, &[9, 0, 0]).unwrap(); // bad area
        assert_eq!(
            StationMessage::from_frame(&frame),
            Err(FrameError::Malformed)
        );

        let frame = Frame::empty(0x7F); // unknown type
        assert_eq!(
            StationMessage::from_frame(&frame),
            Err(FrameError::Malformed)
        );
    }
}
