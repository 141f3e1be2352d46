//! The foreground control loop
//!
//! Runs the three phase machines at a 10 ms cadence, translates encoder
//! and switch events, applies machine actions to the units and the
//! configuration, and publishes the dashboard state to the display link.
//! Configuration writes happen only here, and only when a switch-off path
//! asks for them.

use defmt::{info, warn};
use embassy_time::{Duration, Instant, Ticker};

use stannum_core::config::StationConfig;
use stannum_core::device::Device;
use stannum_core::persist::{BootStatus, PersistStore};
use stannum_core::state::{
    Phase, PhaseAction, PhaseContext, PhaseEvent, PhaseMachine, UnitSnapshot,
};
use stannum_core::traits::UnitController;
use stannum_protocol::{DisplayArea, InputEvent, StationMessage};

use crate::channels::{
    with_power, SwitchEvent, BEEPS, DISPLAY_MESSAGES, INPUT_EVENTS, SWITCH_EVENTS,
};
use crate::flash::StationFlash;

const TICK_MS: u64 = 10;
/// Dashboard refresh spacing, ticks
const REFRESH_TICKS: u32 = 50;
/// How long the lower encoder stays in fan-edit mode, ms
const FAN_EDIT_TIMEOUT_MS: u32 = 5000;

// Display error codes
const ERR_NO_TIP_LIST: u8 = 1;
const ERR_CONFIG_READ: u8 = 2;
const ERR_SAVE_FAILED: u8 = 3;

/// What the lower encoder currently edits
enum GunEdit {
    Temp,
    Fan { until: u32 },
}

#[embassy_executor::task]
pub async fn control_task(
    mut station: StationConfig,
    mut store: PersistStore<StationFlash>,
    boot: BootStatus,
) {
    match boot {
        BootStatus::Ok => info!("configuration loaded"),
        BootStatus::NoTip => {
            warn!("no tip activated yet");
            publish(StationMessage::Dialog {
                code: ERR_NO_TIP_LIST,
                answer: true,
            });
        }
        BootStatus::NoTipList => {
            warn!("tip list missing");
            publish(StationMessage::Error {
                code: ERR_NO_TIP_LIST,
                param: None,
            });
        }
        BootStatus::ReadError => {
            warn!("persistent storage unreadable");
            publish(StationMessage::Error {
                code: ERR_CONFIG_READ,
                param: None,
            });
        }
    }

    // The plugged-in handle decides which iron the channel drives
    let mut handle_present = with_power(|p| !p.ambient.no_handle()).unwrap_or(false);
    let mut iron_device = if handle_present { Device::T12 } else { Device::Jbc };
    let params = station.store.pid_params(iron_device);
    with_power(|p| {
        p.iron.enable_check(handle_present);
        p.iron.load_pid(params);
    });

    let mut iron = PhaseMachine::new(iron_device);
    let mut gun = PhaseMachine::new(Device::Gun);
    let mut gun_edit = GunEdit::Temp;
    let mut tilt_level = false;
    let mut tilt_edge = false;
    let mut refresh = 0u32;

    publish_tip_names(&station, iron_device);

    if boot == BootStatus::Ok && station.store.is_auto_start() && iron_device == Device::T12 {
        let ctx = phase_ctx(&station, Device::T12, handle_present);
        let actions = iron.power_on_start(&ctx);
        apply_actions(&mut station, &mut store, iron_device, &actions).await;
    }

    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS));
    loop {
        ticker.next().await;
        let now_ms = Instant::now().as_millis() as u32;

        // Handle arbitration: plugging the T12 handle in or out swaps the
        // iron channel between the T12 and the JBC
        let present = with_power(|p| !p.ambient.no_handle()).unwrap_or(false);
        if present != handle_present {
            handle_present = present;
            let new_device = if present { Device::T12 } else { Device::Jbc };
            info!("iron channel is now {}", new_device);
            let params = station.store.pid_params(new_device);
            with_power(|p| {
                p.iron.switch_power(false);
                p.iron.enable_check(present);
                p.iron.load_pid(params);
            });
            iron_device = new_device;
            iron = PhaseMachine::new(new_device);
            store.install_current_curves(&mut station).await;
            publish_tip_names(&station, iron_device);
        }

        // Encoder events from the display link
        while let Ok(event) = INPUT_EVENTS.try_receive() {
            match event {
                InputEvent::UpperClick => {
                    let ctx = phase_ctx(&station, iron_device, handle_present);
                    let actions = iron.on_event(PhaseEvent::EncoderShort, &ctx, now_ms);
                    apply_actions(&mut station, &mut store, iron_device, &actions).await;
                }
                InputEvent::UpperLong => {
                    let ctx = phase_ctx(&station, iron_device, handle_present);
                    let actions = iron.on_event(PhaseEvent::EncoderLong, &ctx, now_ms);
                    apply_actions(&mut station, &mut store, iron_device, &actions).await;
                }
                InputEvent::UpperCw | InputEvent::UpperCcw => {
                    let next = stepped_preset(&station, iron_device, event.rotation());
                    let ctx = phase_ctx(&station, iron_device, handle_present);
                    let actions = iron.on_event(PhaseEvent::EncoderRotate(next), &ctx, now_ms);
                    apply_actions(&mut station, &mut store, iron_device, &actions).await;
                }
                InputEvent::LowerClick => {
                    if gun.phase() == Phase::LowPwr {
                        let ctx = phase_ctx(&station, Device::Gun, true);
                        let actions = gun.on_event(PhaseEvent::EncoderShort, &ctx, now_ms);
                        apply_actions(&mut station, &mut store, Device::Gun, &actions).await;
                    } else {
                        // Toggle between temperature and fan editing
                        gun_edit = match gun_edit {
                            GunEdit::Temp => {
                                publish(StationMessage::Fan {
                                    pcnt: fan_pcnt(),
                                    modifying: true,
                                });
                                GunEdit::Fan {
                                    until: now_ms + FAN_EDIT_TIMEOUT_MS,
                                }
                            }
                            GunEdit::Fan { .. } => {
                                publish(StationMessage::Fan {
                                    pcnt: fan_pcnt(),
                                    modifying: false,
                                });
                                GunEdit::Temp
                            }
                        };
                    }
                }
                InputEvent::LowerLong => {
                    // Menu entry is the display's business; re-publish state
                    publish_tip_names(&station, iron_device);
                }
                InputEvent::LowerCw | InputEvent::LowerCcw => match gun_edit {
                    GunEdit::Temp => {
                        let next = stepped_preset(&station, Device::Gun, event.rotation());
                        let ctx = phase_ctx(&station, Device::Gun, true);
                        let actions = gun.on_event(PhaseEvent::EncoderRotate(next), &ctx, now_ms);
                        apply_actions(&mut station, &mut store, Device::Gun, &actions).await;
                    }
                    GunEdit::Fan { .. } => {
                        let fan = with_power(|p| {
                            let next = p
                                .gun
                                .fan_preset()
                                .saturating_add_signed(event.rotation() as i16 * 50);
                            p.gun.set_fan(next);
                            p.gun.fan_preset()
                        })
                        .unwrap_or(0);
                        station.store.save_gun_preset(station.store.preset(Device::Gun), fan);
                        gun_edit = GunEdit::Fan {
                            until: now_ms + FAN_EDIT_TIMEOUT_MS,
                        };
                        publish(StationMessage::Fan {
                            pcnt: fan_pcnt(),
                            modifying: true,
                        });
                    }
                },
            }
        }
        if let GunEdit::Fan { until } = gun_edit {
            if now_ms >= until {
                gun_edit = GunEdit::Temp;
                publish(StationMessage::Fan {
                    pcnt: fan_pcnt(),
                    modifying: false,
                });
            }
        }

        // Debounced hardware switches
        while let Ok(event) = SWITCH_EVENTS.try_receive() {
            match event {
                SwitchEvent::Tilt { level, edge } => {
                    tilt_level = level;
                    tilt_edge |= edge;
                }
                SwitchEvent::JbcStand { offhook } => {
                    if iron_device == Device::Jbc {
                        let ctx = phase_ctx(&station, Device::Jbc, handle_present);
                        let actions =
                            iron.on_event(PhaseEvent::SwitchChange(offhook), &ctx, now_ms);
                        apply_actions(&mut station, &mut store, Device::Jbc, &actions).await;
                    }
                }
                SwitchEvent::JbcChange { active } => {
                    if iron_device == Device::Jbc && active {
                        let ctx = phase_ctx(&station, Device::Jbc, handle_present);
                        let actions = iron.on_event(PhaseEvent::TipChange, &ctx, now_ms);
                        apply_actions(&mut station, &mut store, Device::Jbc, &actions).await;
                    }
                }
                SwitchEvent::GunReed { offcradle } => {
                    let ctx = phase_ctx(&station, Device::Gun, true);
                    let actions = gun.on_event(PhaseEvent::SwitchChange(offcradle), &ctx, now_ms);
                    apply_actions(&mut station, &mut store, Device::Gun, &actions).await;
                }
            }
        }

        // Faults and lost heaters
        for (machine, device) in [(&mut iron, iron_device), (&mut gun, Device::Gun)] {
            let (fault, connected, ac_ok) = with_power(|p| {
                let unit: &mut dyn UnitController = if device == Device::Gun {
                    &mut p.gun
                } else {
                    &mut p.iron
                };
                (unit.fault(), unit.is_connected(), p.pipeline.ac_ok())
            })
            .unwrap_or((None, true, false));

            if fault.is_some() && !machine.is_fatal() {
                warn!("{} safety trip", device);
                let ctx = phase_ctx(&station, device, handle_present);
                let actions = machine.on_event(PhaseEvent::SafetyTrip, &ctx, now_ms);
                apply_actions(&mut station, &mut store, device, &actions).await;
            }
            if !connected && ac_ok && machine.phase().is_working() {
                warn!("{} not connected", device);
                let ctx = phase_ctx(&station, device, handle_present);
                let actions = machine.on_event(PhaseEvent::NotConnected, &ctx, now_ms);
                apply_actions(&mut station, &mut store, device, &actions).await;
            }
        }

        // Time-driven transitions
        let reed_mode = station.store.is_reed_type();
        let tilt_active = if reed_mode {
            tilt_level
        } else {
            core::mem::take(&mut tilt_edge)
        };
        let iron_snap = snapshot(iron_device, tilt_active);
        let ctx = phase_ctx(&station, iron_device, handle_present);
        let actions = iron.tick(&ctx, &iron_snap, now_ms);
        apply_actions(&mut station, &mut store, iron_device, &actions).await;

        let gun_snap = snapshot(Device::Gun, false);
        let ctx = phase_ctx(&station, Device::Gun, true);
        let actions = gun.tick(&ctx, &gun_snap, now_ms);
        apply_actions(&mut station, &mut store, Device::Gun, &actions).await;

        // Dashboard refresh
        refresh += 1;
        if refresh >= REFRESH_TICKS {
            refresh = 0;
            publish_dashboard(&station, iron_device, &iron_snap, &gun_snap);
            publish(StationMessage::Phase {
                area: DisplayArea::Upper,
                phase: iron.phase() as u8,
            });
            publish(StationMessage::Phase {
                area: DisplayArea::Lower,
                phase: gun.phase() as u8,
            });
        }
    }
}

/// Configuration snapshot for one heater's phase machine
fn phase_ctx(station: &StationConfig, device: Device, handle_present: bool) -> PhaseContext {
    let record = station.store.record();
    PhaseContext {
        preset_human: station.store.preset(device),
        standby_human: station.standby_temp(device),
        standby_enabled: record.low_temp(device) > 0,
        low_to: record.t12_low_to,
        off_timeout_min: record.off_timeout(device),
        boost_temp: record.boost_temp(),
        boost_duration_s: record.boost_duration(),
        handle_present: handle_present || device != Device::T12,
        is_celsius: station.store.is_celsius(),
    }
}

/// Averaged unit state for one heater
fn snapshot(device: Device, tilt_active: bool) -> UnitSnapshot {
    with_power(|p| {
        let unit: &mut dyn UnitController = if device == Device::Gun {
            &mut p.gun
        } else {
            &mut p.iron
        };
        UnitSnapshot {
            average_temp: unit.average_temp(),
            preset_temp: unit.preset_temp(),
            avg_power: unit.avg_power(),
            temp_dispersion: unit.temp_dispersion(),
            pwr_dispersion: unit.pwr_dispersion(),
            cold: unit.is_cold(),
            tilt_active,
        }
    })
    .unwrap_or_default()
}

/// A rotation step lands on the next preset in display units
fn stepped_preset(station: &StationConfig, device: Device, rotation: i8) -> u16 {
    let step: i16 = if station.store.is_big_step() { 5 } else { 1 };
    let current = station.store.preset(device) as i16;
    let mut next = current + rotation as i16 * step;
    if step == 5 {
        next -= next.rem_euclid(5);
    }
    next.clamp(
        station.store.temp_min(device) as i16,
        station.store.temp_max(device) as i16,
    ) as u16
}

async fn apply_actions(
    station: &mut StationConfig,
    store: &mut PersistStore<StationFlash>,
    device: Device,
    actions: &[PhaseAction],
) {
    let area = display_area(device);
    let ambient = ambient_celsius();
    for action in actions {
        match *action {
            PhaseAction::Arm => {
                let human = station.store.preset(device);
                let raw = station.human_to_temp(human, ambient, device);
                with_power(|p| {
                    if device == Device::Gun {
                        p.gun.set_temp(raw);
                        p.gun.set_fan(station.store.gun_fan_preset());
                        p.gun.switch_power(true);
                    } else {
                        p.iron.set_temp(raw);
                        p.iron.switch_power(true);
                    }
                });
            }
            PhaseAction::Disarm => {
                with_power(|p| {
                    if device == Device::Gun {
                        p.gun.switch_power(false);
                    } else {
                        p.iron.switch_power(false);
                    }
                });
            }
            PhaseAction::SetLowPower => {
                let human = station.standby_temp(device);
                let raw = station.human_to_temp_low(human, ambient, device);
                with_power(|p| {
                    if device == Device::Gun {
                        p.gun.low_power_mode(raw);
                    } else {
                        p.iron.low_power_mode(raw);
                    }
                });
            }
            PhaseAction::SetBoost { temp_human } => {
                let raw = station.human_to_temp(temp_human, ambient, device);
                with_power(|p| p.iron.boost_power_mode(raw));
            }
            PhaseAction::UpdatePreset { temp_human } => {
                station.store.set_preset(device, temp_human);
                let human = station.store.preset(device);
                let raw = station.human_to_temp(human, ambient, device);
                with_power(|p| {
                    let on = if device == Device::Gun {
                        p.gun.is_on()
                    } else {
                        p.iron.is_on()
                    };
                    if on {
                        if device == Device::Gun {
                            p.gun.set_temp(raw);
                        } else {
                            p.iron.set_temp(raw);
                        }
                    }
                });
            }
            PhaseAction::SaveConfig => {
                if store.save_config(&mut station.store).await.is_err() {
                    warn!("configuration write failed");
                    publish(StationMessage::Error {
                        code: ERR_SAVE_FAILED,
                        param: None,
                    });
                }
            }
            PhaseAction::Beep(kind) => {
                if station.store.is_buzzer_enabled() {
                    let _ = BEEPS.try_send(kind);
                }
            }
            PhaseAction::ShowPhase => {
                // The phase is republished with the next dashboard refresh
            }
            PhaseAction::ShowPreset { temp_human } => {
                publish(StationMessage::PresetTemp {
                    area,
                    temp: temp_human,
                });
            }
            PhaseAction::ShowCountdown { seconds } => {
                publish(StationMessage::TimeToOff {
                    area,
                    seconds: seconds.min(u16::MAX as u32) as u16,
                });
            }
            PhaseAction::TipSelect => {
                // Tip selection is a display mode; hand it the current name
                publish_tip_names(station, device);
            }
        }
    }
}

fn publish_dashboard(
    station: &StationConfig,
    iron_device: Device,
    iron_snap: &UnitSnapshot,
    gun_snap: &UnitSnapshot,
) {
    let ambient = ambient_celsius();
    for (area, device, snap) in [
        (DisplayArea::Upper, iron_device, iron_snap),
        (DisplayArea::Lower, Device::Gun, gun_snap),
    ] {
        let temp = station.temp_to_human(snap.average_temp, ambient, device);
        let preset = station.temp_to_human(snap.preset_temp, ambient, device);
        publish(StationMessage::Temp { area, temp });
        publish(StationMessage::TempGauge {
            area,
            delta: temp as i16 - preset as i16,
        });
    }
    let (iron_pcnt, gun_pcnt, fan_working) = with_power(|p| {
        (
            p.iron.avg_power_pcnt(),
            p.gun.avg_power_pcnt(),
            p.gun.is_fan_working(),
        )
    })
    .unwrap_or((0, 0, false));
    publish(StationMessage::Power {
        area: DisplayArea::Upper,
        pcnt: iron_pcnt,
    });
    publish(StationMessage::Power {
        area: DisplayArea::Lower,
        pcnt: gun_pcnt,
    });
    publish(StationMessage::Ambient {
        celsius: ambient,
        is_celsius: station.store.is_celsius(),
    });
    if fan_working {
        publish(StationMessage::FanAnim {
            delta: gun_snap.average_temp as i16 - gun_snap.preset_temp as i16,
        });
    }
}

fn publish_tip_names(station: &StationConfig, iron_device: Device) {
    publish(StationMessage::TipName {
        area: DisplayArea::Upper,
        calibrated: station.is_tip_calibrated(iron_device),
        name: station.tip_name(iron_device),
    });
}

fn publish(message: StationMessage) {
    let _ = DISPLAY_MESSAGES.try_send(message);
}

fn ambient_celsius() -> i16 {
    with_power(|p| p.ambient.ambient_celsius()).unwrap_or(25)
}

fn fan_pcnt() -> u8 {
    with_power(|p| p.gun.fan_pcnt()).unwrap_or(0)
}

fn display_area(device: Device) -> DisplayArea {
    match device {
        Device::Gun => DisplayArea::Lower,
        _ => DisplayArea::Upper,
    }
}
