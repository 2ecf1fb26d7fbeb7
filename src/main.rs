//! # tickflow Example Firmware
//!
//! Runs on an STM32F401 Nucleo board: user LED on PA5, user button on PC13
//! (active low). Two independent task trees share one host loop:
//!
//! | Scheduler | Driver | Task | Behavior |
//! |-----------|--------|------|----------|
//! | `beacon` | `run_repeat` | [`Beacon`] | Waits for a press, flashes until release, fades in, then waits up to 5 s for another press |
//! | `heartbeat` | `run_every(2000)` | [`Pulse`] | Two short blips every two seconds while the beacon is idle |
//!
//! The LED is dimmed in software: tasks only set a target level, and the
//! host loop turns that level into a duty cycle every tick.

#![no_std]
#![no_main]

use core::mem::MaybeUninit;
use core::ptr::addr_of_mut;

use cortex_m_rt::entry;
use embedded_alloc::LlffHeap as Heap;
use panic_halt as _;

use tickflow::config::HEAP_SIZE;
use tickflow::kernel;
use tickflow::ops::{Outcome, Winner};
use tickflow::sync::Shared;
use tickflow::{ready, Clock, Context, RunStatus, Scheduler, Step, Task, Value};

#[global_allocator]
static HEAP: Heap = Heap::empty();

static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];

/// LED brightness requested by the tasks, 0–255.
static LEVEL: Shared<Value> = Shared::new(0);

/// Set while the beacon owns the LED.
static BEACON_ACTIVE: Shared<bool> = Shared::new(false);

// ---------------------------------------------------------------------------
// Board access
// ---------------------------------------------------------------------------

mod board {
    use core::ptr::{read_volatile, write_volatile};

    const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;
    const GPIOA_MODER: *mut u32 = 0x4002_0000 as *mut u32;
    const GPIOA_BSRR: *mut u32 = 0x4002_0018 as *mut u32;
    const GPIOC_IDR: *const u32 = 0x4002_0810 as *const u32;

    const LED_PIN: u32 = 5;
    const BUTTON_PIN: u32 = 13;

    /// Clock GPIOA and GPIOC, and make PA5 a push-pull output.
    pub fn init() {
        // SAFETY: fixed STM32F4 register addresses, accessed from the main
        // thread only, before any task runs.
        unsafe {
            let enr = read_volatile(RCC_AHB1ENR);
            write_volatile(RCC_AHB1ENR, enr | (1 << 0) | (1 << 2));
            let moder = read_volatile(GPIOA_MODER);
            let moder = (moder & !(0b11 << (LED_PIN * 2))) | (0b01 << (LED_PIN * 2));
            write_volatile(GPIOA_MODER, moder);
        }
    }

    pub fn set_led(on: bool) {
        let bit = if on { LED_PIN } else { LED_PIN + 16 };
        // SAFETY: BSRR writes are atomic set/reset of a single pin.
        unsafe { write_volatile(GPIOA_BSRR, 1 << bit) }
    }

    pub fn button_pressed() -> bool {
        // SAFETY: read-only access to the input data register.
        unsafe { read_volatile(GPIOC_IDR) & (1 << BUTTON_PIN) == 0 }
    }
}

/// Software PWM with a 16 ms period: on for the first `level/16` ms.
fn render_led(now_ms: u32, level: Value) {
    let phase = (now_ms % 16) as Value;
    board::set_led(phase * 16 < level);
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Toggle the LED `times` times, `period` ms per half cycle.
struct Blink {
    times: u32,
    period: u32,
    lit: bool,
}

impl Blink {
    fn new(times: u32, period: u32) -> Self {
        Self {
            times,
            period,
            lit: false,
        }
    }
}

impl Task for Blink {
    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        loop {
            if !self.lit && self.times == 0 {
                LEVEL.set(0);
                return Ok(RunStatus::Done);
            }
            LEVEL.set(if self.lit { 255 } else { 0 });
            ready!(cx.delay(self.period));
            if self.lit {
                self.times -= 1;
            }
            self.lit = !self.lit;
        }
    }

    fn name(&self) -> &'static str {
        "blink"
    }
}

/// Finishes once the button is in the wanted state.
struct Button {
    pressed: bool,
}

impl Button {
    fn press() -> Self {
        Self { pressed: true }
    }

    fn release() -> Self {
        Self { pressed: false }
    }
}

impl Task for Button {
    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        ready!(cx.wait_until(board::button_pressed() == self.pressed));
        Ok(RunStatus::Done)
    }

    fn name(&self) -> &'static str {
        if self.pressed {
            "press"
        } else {
            "release"
        }
    }
}

#[derive(Clone, Copy)]
enum BeaconAt {
    Armed,
    Flashing,
    Fading,
    FadeHold,
    Lingering,
}

/// The interactive task: press → flash until release → fade in → linger.
/// Holding the button through all 50 flashes skips the fade.
struct Beacon {
    at: BeaconAt,
}

impl Task for Beacon {
    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        loop {
            match self.at {
                BeaconAt::Armed => {
                    ready!(cx.andthen(Button::press)?);
                    BEACON_ACTIVE.set(true);
                    self.at = BeaconAt::Flashing;
                }
                BeaconAt::Flashing => {
                    let winner = ready!(cx.until(Button::release, || Blink::new(50, 60))?);
                    self.at = match winner {
                        Winner::First => BeaconAt::Fading,
                        Winner::Second => BeaconAt::Lingering,
                    };
                }
                BeaconAt::Fading => match cx.ramp(1000, 0, 255) {
                    Some(level) => {
                        LEVEL.set(level);
                        self.at = BeaconAt::FadeHold;
                    }
                    None => self.at = BeaconAt::Lingering,
                },
                BeaconAt::FadeHold => {
                    ready!(cx.delay(20));
                    self.at = BeaconAt::Fading;
                }
                BeaconAt::Lingering => {
                    let outcome = ready!(cx.for_at_most(5000, Button::press)?);
                    LEVEL.set(0);
                    BEACON_ACTIVE.set(false);
                    if outcome == Outcome::TimedOut {
                        return cx.finish();
                    }
                    // Pressed again: go straight back to flashing.
                    BEACON_ACTIVE.set(true);
                    self.at = BeaconAt::Flashing;
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "beacon"
    }
}

/// Two short blips, skipped while the beacon owns the LED.
struct Pulse;

impl Task for Pulse {
    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        if BEACON_ACTIVE.get() {
            return Ok(RunStatus::Done);
        }
        ready!(cx.andthen(|| Blink::new(2, 80))?);
        Ok(RunStatus::Done)
    }

    fn name(&self) -> &'static str {
        "pulse"
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    // SAFETY: called once, before the first allocation; HEAP_MEM is not
    // referenced anywhere else.
    unsafe { HEAP.init(addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE) }

    let Some(mut cp) = cortex_m::Peripherals::take() else {
        tickflow::arch::cortex_m4::halt()
    };
    board::init();
    let clock = kernel::init(&mut cp.SYST, &mut cp.SCB);

    let mut beacon = Scheduler::new();
    let mut heartbeat = Scheduler::new();

    loop {
        kernel::or_halt(beacon.run_repeat(&clock, || Beacon {
            at: BeaconAt::Armed,
        }));
        kernel::or_halt(heartbeat.run_every(&clock, 2000, || Pulse));

        render_led(clock.now().0, LEVEL.get());
    }
}
