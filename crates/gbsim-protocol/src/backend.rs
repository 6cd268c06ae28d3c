//! Side-effect seams between device handlers and whatever drives the
//! simulated hardware.

use serde::{Deserialize, Serialize};

/// Backend selected for newly bound handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Answer requests without touching any device state.
    #[default]
    None,
    /// Keep in-memory channel and line state.
    Simulated,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::None => "none",
            BackendKind::Simulated => "simulated",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// PWM side effects. Indices are validated by the caller.
pub trait PwmBackend: Send {
    fn activate(&mut self, which: usize, active: bool);
    fn configure(&mut self, which: usize, duty_ns: u32, period_ns: u32);
    fn set_polarity(&mut self, which: usize, inverted: bool);
    fn set_enabled(&mut self, which: usize, enabled: bool);
}

/// GPIO side effects and line reads. Indices are validated by the caller.
pub trait GpioBackend: Send {
    fn activate(&mut self, which: usize, active: bool);
    fn direction(&self, which: usize) -> u8;
    fn set_input(&mut self, which: usize);
    fn set_output(&mut self, which: usize, value: u8);
    fn value(&self, which: usize) -> u8;
    fn set_value(&mut self, which: usize, value: u8);
    fn set_debounce(&mut self, which: usize, usec: u16);
    fn set_irq_type(&mut self, which: usize, irq_type: u8);
    fn set_irq_masked(&mut self, which: usize, masked: bool);
    fn ack_irq(&mut self, which: usize);
}

/// Backend that discards every side effect and reads back zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl PwmBackend for NullBackend {
    fn activate(&mut self, _which: usize, _active: bool) {}
    fn configure(&mut self, _which: usize, _duty_ns: u32, _period_ns: u32) {}
    fn set_polarity(&mut self, _which: usize, _inverted: bool) {}
    fn set_enabled(&mut self, _which: usize, _enabled: bool) {}
}

impl GpioBackend for NullBackend {
    fn activate(&mut self, _which: usize, _active: bool) {}
    fn direction(&self, _which: usize) -> u8 {
        0
    }
    fn set_input(&mut self, _which: usize) {}
    fn set_output(&mut self, _which: usize, _value: u8) {}
    fn value(&self, _which: usize) -> u8 {
        0
    }
    fn set_value(&mut self, _which: usize, _value: u8) {}
    fn set_debounce(&mut self, _which: usize, _usec: u16) {}
    fn set_irq_type(&mut self, _which: usize, _irq_type: u8) {}
    fn set_irq_masked(&mut self, _which: usize, _masked: bool) {}
    fn ack_irq(&mut self, _which: usize) {}
}

/// State of one simulated PWM channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PwmChannel {
    pub active: bool,
    pub duty_ns: u32,
    pub period_ns: u32,
    pub inverted: bool,
    pub enabled: bool,
}

/// In-memory PWM chip.
#[derive(Debug, Clone)]
pub struct SimulatedPwm {
    channels: Vec<PwmChannel>,
}

impl SimulatedPwm {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: vec![PwmChannel::default(); channels],
        }
    }

    pub fn channel(&self, which: usize) -> Option<&PwmChannel> {
        self.channels.get(which)
    }
}

impl PwmBackend for SimulatedPwm {
    fn activate(&mut self, which: usize, active: bool) {
        if let Some(ch) = self.channels.get_mut(which) {
            ch.active = active;
        }
    }

    fn configure(&mut self, which: usize, duty_ns: u32, period_ns: u32) {
        if let Some(ch) = self.channels.get_mut(which) {
            ch.duty_ns = duty_ns;
            ch.period_ns = period_ns;
        }
    }

    fn set_polarity(&mut self, which: usize, inverted: bool) {
        if let Some(ch) = self.channels.get_mut(which) {
            ch.inverted = inverted;
        }
    }

    fn set_enabled(&mut self, which: usize, enabled: bool) {
        if let Some(ch) = self.channels.get_mut(which) {
            ch.enabled = enabled;
        }
    }
}

/// Line direction as reported on the wire.
pub const GPIO_DIRECTION_OUT: u8 = 0;
pub const GPIO_DIRECTION_IN: u8 = 1;

/// State of one simulated GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioLine {
    pub active: bool,
    pub direction: u8,
    pub value: u8,
    pub debounce_usec: u16,
    pub irq_type: u8,
    pub irq_masked: bool,
    pub irq_acks: u32,
}

impl Default for GpioLine {
    fn default() -> Self {
        Self {
            active: false,
            direction: GPIO_DIRECTION_IN,
            value: 0,
            debounce_usec: 0,
            irq_type: 0,
            irq_masked: true,
            irq_acks: 0,
        }
    }
}

/// In-memory GPIO chip.
#[derive(Debug, Clone)]
pub struct SimulatedGpio {
    lines: Vec<GpioLine>,
}

impl SimulatedGpio {
    pub fn new(lines: usize) -> Self {
        Self {
            lines: vec![GpioLine::default(); lines],
        }
    }

    pub fn line(&self, which: usize) -> Option<&GpioLine> {
        self.lines.get(which)
    }

    fn update(&mut self, which: usize, f: impl FnOnce(&mut GpioLine)) {
        if let Some(line) = self.lines.get_mut(which) {
            f(line);
        }
    }
}

impl GpioBackend for SimulatedGpio {
    fn activate(&mut self, which: usize, active: bool) {
        self.update(which, |line| line.active = active);
    }

    fn direction(&self, which: usize) -> u8 {
        self.lines
            .get(which)
            .map_or(GPIO_DIRECTION_IN, |line| line.direction)
    }

    fn set_input(&mut self, which: usize) {
        self.update(which, |line| line.direction = GPIO_DIRECTION_IN);
    }

    fn set_output(&mut self, which: usize, value: u8) {
        self.update(which, |line| {
            line.direction = GPIO_DIRECTION_OUT;
            line.value = value;
        });
    }

    fn value(&self, which: usize) -> u8 {
        self.lines.get(which).map_or(0, |line| line.value)
    }

    fn set_value(&mut self, which: usize, value: u8) {
        self.update(which, |line| line.value = value);
    }

    fn set_debounce(&mut self, which: usize, usec: u16) {
        self.update(which, |line| line.debounce_usec = usec);
    }

    fn set_irq_type(&mut self, which: usize, irq_type: u8) {
        self.update(which, |line| line.irq_type = irq_type);
    }

    fn set_irq_masked(&mut self, which: usize, masked: bool) {
        self.update(which, |line| line.irq_masked = masked);
    }

    fn ack_irq(&mut self, which: usize) {
        self.update(which, |line| line.irq_acks = line.irq_acks.saturating_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_uses_lowercase_names() {
        let kind: BackendKind = serde_json::from_str("\"simulated\"").unwrap();
        assert_eq!(kind, BackendKind::Simulated);
        assert_eq!(serde_json::to_string(&BackendKind::None).unwrap(), "\"none\"");
        assert_eq!(BackendKind::default(), BackendKind::None);
    }

    #[test]
    fn simulated_pwm_records_channel_state() {
        let mut pwm = SimulatedPwm::new(2);
        pwm.configure(1, 500, 1000);
        pwm.set_enabled(1, true);

        let ch = pwm.channel(1).unwrap();
        assert_eq!((ch.duty_ns, ch.period_ns, ch.enabled), (500, 1000, true));
        assert_eq!(pwm.channel(0), Some(&PwmChannel::default()));
    }

    #[test]
    fn simulated_gpio_output_sets_direction_and_value() {
        let mut gpio = SimulatedGpio::new(6);
        assert_eq!(gpio.direction(3), GPIO_DIRECTION_IN);

        gpio.set_output(3, 1);
        assert_eq!(gpio.direction(3), GPIO_DIRECTION_OUT);
        assert_eq!(gpio.value(3), 1);

        gpio.set_input(3);
        assert_eq!(gpio.direction(3), GPIO_DIRECTION_IN);
    }

    #[test]
    fn null_backend_reads_zero() {
        let gpio = NullBackend;
        assert_eq!(GpioBackend::direction(&gpio, 0), 0);
        assert_eq!(gpio.value(0), 0);
    }
}
