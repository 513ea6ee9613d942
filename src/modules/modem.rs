//! Module bring-up, SIM handling, identification and power control.

use embassy_time::Timer;
use embedded_hal::digital::OutputPin;
use embedded_io_async::{Read, Write};
use heapless::String;

use crate::client::CavliClient;
use crate::command::{Command, Functionality, SleepMode};
use crate::config::CellularConfig;
use crate::error::Error;
use crate::module_timing::{boot_time, command_timeout, functionality_timeout, reset_time};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SimStatus {
    Ready,
    PinRequired,
    PukRequired,
    NotInserted,
    NotReady,
}

pub trait Modem {
    /// Probe the AT interface until the module answers.
    async fn is_alive(&mut self) -> Result<(), Error>;

    /// Bring the module to a known state: echo off, error reporting per
    /// config, external SIM selected, SIM unlocked if a PIN is given.
    async fn init(&mut self, pin: Option<&str>) -> Result<(), Error>;

    async fn model_name(&mut self) -> Result<String<64>, Error>;

    async fn ccid(&mut self) -> Result<String<64>, Error>;

    async fn sim_status(&mut self) -> Result<SimStatus, Error>;

    async fn sim_unlock(&mut self, pin: &str) -> Result<(), Error>;

    async fn set_functionality(&mut self, fun: Functionality, reset: bool) -> Result<(), Error>;

    async fn factory_defaults(&mut self) -> Result<(), Error>;

    /// Store settings, bounce through minimum functionality and reboot,
    /// then run `init` again.
    async fn restart(&mut self, pin: Option<&str>) -> Result<(), Error>;

    async fn power_off(&mut self) -> Result<(), Error>;

    /// Enter a `$QCSLEEP` power saving mode. The serial interface is dead
    /// while asleep; `wake` is the only way back.
    async fn sleep(&mut self, mode: SleepMode) -> Result<(), Error>;

    /// Pulse the reset line to bring the module out of sleep.
    async fn wake(&mut self) -> Result<(), Error>;
}

impl<W, C, const N: usize, const L: usize> Modem for CavliClient<W, C, N, L>
where
    W: Read + Write,
    C: CellularConfig,
{
    async fn is_alive(&mut self) -> Result<(), Error> {
        for _ in 0..15 {
            if let Ok(0) = self.command(&Command::At, command_timeout()).await {
                return Ok(());
            }
        }
        Err(Error::BaudDetection)
    }

    async fn init(&mut self, pin: Option<&str>) -> Result<(), Error> {
        self.is_alive().await?;

        self.command_ok(&Command::EchoOff, command_timeout()).await?;
        let _ = self
            .command(
                &Command::SetErrorReporting {
                    verbose: C::VERBOSE_ERRORS,
                },
                command_timeout(),
            )
            .await;

        let name = self.model_name().await?;
        debug!("Modem: {}", name.as_str());

        // Select the external SIM. Sending this once is not enough; if
        // not done twice you get a "not powered on" error later.
        for _ in 0..2 {
            self.send_at(&Command::SimSwap).await?;
            let mut acked = false;
            for _ in 0..30 {
                if let Ok(0) = self
                    .wait_response_in(command_timeout(), &["+CAVEUICCSUPPORT:"])
                    .await
                {
                    acked = true;
                    break;
                }
            }
            if !acked {
                return Err(Error::Timeout);
            }
        }

        let status = self.sim_status().await?;
        match (status, pin) {
            (SimStatus::Ready, _) => Ok(()),
            (_, Some(pin)) if !pin.is_empty() => {
                self.sim_unlock(pin).await?;
                if self.sim_status().await? == SimStatus::Ready {
                    Ok(())
                } else {
                    Err(Error::Pin)
                }
            }
            // Locked but no PIN given: leave unlocking to the caller.
            (SimStatus::PinRequired | SimStatus::PukRequired, _) => Ok(()),
            _ => Err(Error::Pin),
        }
    }

    async fn model_name(&mut self) -> Result<String<64>, Error> {
        // The OK may come before or after the +CGMM reply.
        self.send_at(&Command::GetModelId).await?;
        match self
            .wait_response_in(command_timeout(), &["+CGMM: ", "ERROR\r\n"])
            .await
        {
            Ok(0) => {
                let name = self.read_line(command_timeout()).await?;
                let _ = self.wait_response(command_timeout()).await;
                Ok(name)
            }
            Ok(_) | Err(Error::Timeout) => {
                Ok(String::try_from("Cavli C16QS").map_err(|_| Error::InvalidResponse)?)
            }
            Err(e) => Err(e),
        }
    }

    async fn ccid(&mut self) -> Result<String<64>, Error> {
        self.send_at(&Command::GetCcid).await?;
        if self
            .wait_response_in(command_timeout(), &["\r\n"])
            .await
            .is_err()
        {
            return Err(Error::InvalidResponse);
        }
        let line = self.read_line(command_timeout()).await?;
        let _ = self.wait_response(command_timeout()).await;

        // The header may or may not be there, depending on firmware.
        let ccid = line
            .as_str()
            .strip_prefix("+ICCID:")
            .unwrap_or(line.as_str())
            .trim();
        String::try_from(ccid).map_err(|_| Error::InvalidResponse)
    }

    async fn sim_status(&mut self) -> Result<SimStatus, Error> {
        self.send_at(&Command::GetPinStatus).await?;
        if self
            .wait_response_in(command_timeout(), &["\r\n+CPIN:"])
            .await
            != Ok(0)
        {
            return Err(Error::InvalidResponse);
        }
        // "NOT READY" ends with "READY", so the specific strings must be
        // matched ahead of the plain one.
        let status = self
            .wait_response_in(
                command_timeout(),
                &["SIM PIN", "SIM PUK", "NOT INSERTED", "NOT READY", "READY"],
            )
            .await?;
        let _ = self.wait_response(command_timeout()).await;

        Ok(match status {
            0 => SimStatus::PinRequired,
            1 => SimStatus::PukRequired,
            2 => SimStatus::NotInserted,
            3 => SimStatus::NotReady,
            _ => SimStatus::Ready,
        })
    }

    async fn sim_unlock(&mut self, pin: &str) -> Result<(), Error> {
        self.command_ok(&Command::SetPin { pin }, command_timeout())
            .await
    }

    async fn set_functionality(&mut self, fun: Functionality, reset: bool) -> Result<(), Error> {
        self.command_ok(
            &Command::SetFunctionality { fun, reset },
            functionality_timeout(),
        )
        .await
    }

    async fn factory_defaults(&mut self) -> Result<(), Error> {
        let _ = self.command(&Command::FactoryDefaults, command_timeout()).await;
        let _ = self.command(&Command::EchoOff, command_timeout()).await;
        self.command_ok(&Command::StoreConfiguration, command_timeout())
            .await
    }

    async fn restart(&mut self, pin: Option<&str>) -> Result<(), Error> {
        self.is_alive().await?;
        let _ = self
            .command(&Command::StoreConfiguration, command_timeout())
            .await;
        self.set_functionality(Functionality::Minimum, false).await?;
        self.set_functionality(Functionality::Full, true).await?;
        Timer::after(boot_time()).await;
        self.init(pin).await
    }

    async fn power_off(&mut self) -> Result<(), Error> {
        self.command_ok(
            &Command::SetFunctionality {
                fun: Functionality::Minimum,
                reset: false,
            },
            functionality_timeout(),
        )
        .await
    }

    async fn sleep(&mut self, mode: SleepMode) -> Result<(), Error> {
        self.command_ok(&Command::SetSleepMode { mode }, command_timeout())
            .await
    }

    async fn wake(&mut self) -> Result<(), Error> {
        if let Some(pin) = self.config.reset_pin() {
            pin.set_low().map_err(|_| Error::IoPin)?;
            Timer::after(reset_time()).await;
            pin.set_high().map_err(|_| Error::IoPin)?;
            Timer::after(boot_time()).await;
            Ok(())
        } else {
            warn!("No reset pin configured");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoPinConfig;
    use crate::test_helpers::MockSerial;

    type Client = CavliClient<MockSerial, NoPinConfig, 8, 64>;

    fn client(script: &[u8]) -> Client {
        CavliClient::new(MockSerial::script(script), NoPinConfig)
    }

    #[tokio::test]
    async fn init_runs_full_bring_up() {
        let mut at = client(
            b"\r\nOK\r\n\
              OK\r\n\
              OK\r\n\
              \r\n+CGMM: C16QS\r\nOK\r\n\
              \r\nOK\r\n+CAVEUICCSUPPORT: 1\r\n\
              \r\nOK\r\n+CAVEUICCSUPPORT: 1\r\n\
              \r\n+CPIN: READY\r\n\r\nOK\r\n",
        );
        assert_eq!(at.init(None).await, Ok(()));

        let written = std::str::from_utf8(at.stream.written()).unwrap();
        assert!(written.starts_with("AT\r\nATE0\r\nAT+CMEE=0\r\nAT+CGMM\r\n"));
        assert_eq!(written.matches("AT^SIMSWAP=1\r\n").count(), 2);
        assert!(written.ends_with("AT+CPIN?\r\n"));
    }

    #[tokio::test]
    async fn locked_sim_with_pin_gets_unlocked() {
        let mut at = client(
            b"\r\n+CPIN: SIM PIN\r\n\r\nOK\r\n\
              OK\r\n\
              \r\n+CPIN: READY\r\n\r\nOK\r\n",
        );
        assert_eq!(at.sim_status().await, Ok(SimStatus::PinRequired));
        assert_eq!(at.sim_unlock("1234").await, Ok(()));
        assert_eq!(at.sim_status().await, Ok(SimStatus::Ready));
        assert!(std::str::from_utf8(at.stream.written())
            .unwrap()
            .contains("AT+CPIN=\"1234\"\r\n"));
    }

    #[tokio::test]
    async fn not_ready_is_not_mistaken_for_ready() {
        let mut at = client(b"\r\n+CPIN: NOT READY\r\n\r\nOK\r\n");
        assert_eq!(at.sim_status().await, Ok(SimStatus::NotReady));
    }

    #[tokio::test]
    async fn model_name_is_read_after_header() {
        let mut at = client(b"\r\n+CGMM: C16QS\r\n\r\nOK\r\n");
        assert_eq!(at.model_name().await.unwrap().as_str(), "C16QS");
    }

    #[tokio::test]
    async fn missing_model_header_falls_back() {
        let mut at = client(b"\r\nERROR\r\n");
        assert_eq!(at.model_name().await.unwrap().as_str(), "Cavli C16QS");
    }

    #[tokio::test]
    async fn ccid_strips_optional_header() {
        let mut at = client(b"\r\n+ICCID: 89882390001234567890\r\n\r\nOK\r\n");
        assert_eq!(at.ccid().await.unwrap().as_str(), "89882390001234567890");
    }
}
