// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Termios serial port with timeout-bounded byte I/O.
//!
//! All reads and writes carry an explicit millisecond timeout implemented
//! with `poll(2)`; modem-control lines are driven through the `TIOCM*`
//! ioctls. After configuration the termios state is read back and
//! verified: a UART that silently negotiated different framing corrupts
//! every rig exchange, so mismatches fail the open.

use crate::{Error, Result};
use std::ffi::CString;
use std::os::unix::io::RawFd;

/// Data word length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Stop bit count. With 8250-compatible UARTs, CSTOPB on a 5-bit word is
/// 1.5 stop bits, which is exactly what Baudot keying wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

/// Parity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    None,
    Cts,
}

/// Serial line configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub path: String,
    pub speed: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow: Flow,
}

impl SerialConfig {
    /// 8N1 at the given speed, the common rig-control framing.
    #[must_use]
    pub fn rig_control(path: &str, speed: u32) -> Self {
        SerialConfig {
            path: path.to_string(),
            speed,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow: Flow::None,
        }
    }

    /// 5 data bits, 1.5 stop, no parity: Baudot FSK keying.
    #[must_use]
    pub fn fsk_keying(path: &str, speed: u32) -> Self {
        SerialConfig {
            path: path.to_string(),
            speed,
            data_bits: DataBits::Five,
            stop_bits: StopBits::OnePointFive,
            parity: Parity::None,
            flow: Flow::None,
        }
    }
}

fn rate_to_macro(speed: u32) -> Option<libc::speed_t> {
    Some(match speed {
        0 => libc::B0,
        1..=50 => libc::B50,
        51..=75 => libc::B75,
        76..=110 => libc::B110,
        111..=134 => libc::B134,
        135..=150 => libc::B150,
        151..=200 => libc::B200,
        201..=300 => libc::B300,
        301..=600 => libc::B600,
        601..=1200 => libc::B1200,
        1201..=1800 => libc::B1800,
        1801..=2400 => libc::B2400,
        2401..=4800 => libc::B4800,
        4801..=9600 => libc::B9600,
        9601..=19200 => libc::B19200,
        19201..=38400 => libc::B38400,
        38401..=57600 => libc::B57600,
        57601..=115_200 => libc::B115200,
        115_201..=230_400 => libc::B230400,
        _ => return None,
    })
}

/// A configured serial line.
#[derive(Debug)]
pub struct SerialPort {
    fd: RawFd,
    flow: Flow,
}

impl SerialPort {
    /// Open and configure the line, then verify the driver accepted the
    /// exact framing.
    pub fn open(cfg: &SerialConfig) -> Result<Self> {
        let cpath = CString::new(cfg.path.as_str())
            .map_err(|_| Error::InvalidArgument(format!("bad device path {:?}", cfg.path)))?;
        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK) };
        if fd == -1 {
            return Err(Error::Fatal(format!(
                "unable to open {}: {}",
                cfg.path,
                std::io::Error::last_os_error()
            )));
        }
        let port = SerialPort { fd, flow: cfg.flow };
        port.configure(cfg)?;
        log::info!(
            "serial {} open at {} baud {:?}/{:?}/{:?}",
            cfg.path,
            cfg.speed,
            cfg.data_bits,
            cfg.parity,
            cfg.stop_bits
        );
        Ok(port)
    }

    fn configure(&self, cfg: &SerialConfig) -> Result<()> {
        let speed =
            rate_to_macro(cfg.speed).ok_or_else(|| {
                Error::InvalidArgument(format!("unsupported speed {}", cfg.speed))
            })?;

        let mut tio = unsafe { std::mem::zeroed::<libc::termios>() };
        if unsafe { libc::tcgetattr(self.fd, &mut tio) } != 0 {
            return Err(Error::Fatal("unable to read terminal attributes".into()));
        }
        unsafe { libc::cfmakeraw(&mut tio) };
        if unsafe { libc::cfsetospeed(&mut tio, speed) } != 0
            || unsafe { libc::cfsetispeed(&mut tio, speed) } != 0
        {
            return Err(Error::Fatal(format!("unable to set {} baud", cfg.speed)));
        }

        tio.c_iflag = libc::IGNBRK | libc::IGNPAR;
        tio.c_oflag = 0;
        tio.c_cflag = libc::CREAD | libc::CLOCAL;
        tio.c_cflag |= match cfg.data_bits {
            DataBits::Five => libc::CS5,
            DataBits::Six => libc::CS6,
            DataBits::Seven => libc::CS7,
            DataBits::Eight => libc::CS8,
        };
        match cfg.stop_bits {
            StopBits::One => {}
            // CSTOPB with CS5 is 1.5 stop bits on 8250-family UARTs.
            StopBits::OnePointFive | StopBits::Two => tio.c_cflag |= libc::CSTOPB,
        }
        match cfg.parity {
            Parity::None => {}
            Parity::Odd => tio.c_cflag |= libc::PARENB | libc::PARODD,
            Parity::Even => tio.c_cflag |= libc::PARENB,
        }
        if cfg.flow == Flow::Cts {
            tio.c_cflag |= libc::CRTSCTS;
        }

        if unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, &tio) } != 0 {
            return Err(Error::Fatal("unable to set terminal attributes".into()));
        }

        // Read back and verify.
        let mut check = unsafe { std::mem::zeroed::<libc::termios>() };
        if unsafe { libc::tcgetattr(self.fd, &mut check) } != 0 {
            return Err(Error::Fatal("unable to re-read terminal attributes".into()));
        }
        if unsafe { libc::cfgetospeed(&check) } != speed
            || unsafe { libc::cfgetispeed(&check) } != speed
        {
            return Err(Error::Fatal(format!(
                "{}: driver did not accept {} baud",
                cfg.path, cfg.speed
            )));
        }
        let want_csize = tio.c_cflag & libc::CSIZE;
        if check.c_cflag & libc::CSIZE != want_csize
            || check.c_cflag & libc::CSTOPB != tio.c_cflag & libc::CSTOPB
            || check.c_cflag & (libc::PARENB | libc::PARODD)
                != tio.c_cflag & (libc::PARENB | libc::PARODD)
        {
            return Err(Error::Fatal(format!(
                "{}: driver did not accept requested framing",
                cfg.path
            )));
        }

        if cfg.flow == Flow::Cts {
            self.set_rts(true)?;
        }
        Ok(())
    }

    /// Program the exact baud fraction through the driver ioctl where the
    /// platform provides one. Elsewhere the nearest integer speed set at
    /// open time is all the hardware can do.
    #[cfg(target_os = "freebsd")]
    pub fn set_fractional_baud(&self, numerator: u32, denominator: u32) -> Result<()> {
        #[repr(C)]
        struct BaudFraction {
            bf_numerator: libc::c_int,
            bf_denominator: libc::c_int,
        }
        const TIOCSFBAUD: libc::c_ulong = 0x8008_747c;
        const TIOCGFBAUD: libc::c_ulong = 0x4008_747b;
        let mut bf = BaudFraction {
            bf_numerator: numerator as libc::c_int,
            bf_denominator: denominator as libc::c_int,
        };
        unsafe {
            libc::ioctl(self.fd, TIOCSFBAUD, &mut bf);
            libc::ioctl(self.fd, TIOCGFBAUD, &mut bf);
        }
        Ok(())
    }

    /// No fractional-baud ioctl on this platform.
    #[cfg(not(target_os = "freebsd"))]
    pub fn set_fractional_baud(&self, _numerator: u32, _denominator: u32) -> Result<()> {
        Ok(())
    }

    fn poll_wait(&self, want_write: bool, timeout_ms: u32) -> Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: if want_write { libc::POLLOUT } else { libc::POLLIN },
            revents: 0,
        };
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms as libc::c_int) };
        match ret {
            -1 => Err(Error::NoDevice),
            0 => Ok(false),
            _ => Ok(pfd.revents & (pfd.events | libc::POLLERR | libc::POLLHUP) != 0),
        }
    }

    /// Wait until the line is readable; `Ok(false)` on timeout.
    pub fn wait_read(&self, timeout_ms: u32) -> Result<bool> {
        self.poll_wait(false, timeout_ms)
    }

    /// Wait until the line is writable; `Ok(false)` on timeout.
    pub fn wait_write(&self, timeout_ms: u32) -> Result<bool> {
        self.poll_wait(true, timeout_ms)
    }

    /// Read exactly `buf.len()` bytes; each byte is bounded by
    /// `timeout_ms`.
    pub fn read_exact(&self, buf: &mut [u8], timeout_ms: u32) -> Result<()> {
        let mut done = 0usize;
        while done < buf.len() {
            if !self.wait_read(timeout_ms)? {
                return Err(Error::Timeout);
            }
            let n = unsafe {
                libc::read(
                    self.fd,
                    buf[done..].as_mut_ptr().cast::<libc::c_void>(),
                    buf.len() - done,
                )
            };
            if n <= 0 {
                return Err(Error::NoDevice);
            }
            done += n as usize;
        }
        Ok(())
    }

    /// Write all of `buf`; each chunk wait is bounded by `timeout_ms`.
    pub fn write_all(&self, buf: &[u8], timeout_ms: u32) -> Result<()> {
        let mut written = 0usize;
        while written < buf.len() {
            if !self.wait_write(timeout_ms)? {
                return Err(Error::Timeout);
            }
            let n = unsafe {
                libc::write(
                    self.fd,
                    buf[written..].as_ptr().cast::<libc::c_void>(),
                    buf.len() - written,
                )
            };
            if n <= 0 {
                return Err(Error::NoDevice);
            }
            written += n as usize;
        }
        Ok(())
    }

    /// Block until the transmit FIFO is empty.
    pub fn drain(&self) -> Result<()> {
        if unsafe { libc::tcdrain(self.fd) } != 0 {
            return Err(Error::NoDevice);
        }
        Ok(())
    }

    /// Discard anything queued for transmission.
    pub fn flush_output(&self) -> Result<()> {
        if unsafe { libc::tcflush(self.fd, libc::TCOFLUSH) } != 0 {
            return Err(Error::NoDevice);
        }
        Ok(())
    }

    /// Bytes waiting in the receive buffer.
    pub fn pending(&self) -> Result<usize> {
        let mut avail: libc::c_int = 0;
        if unsafe { libc::ioctl(self.fd, libc::FIONREAD, &mut avail) } == -1 {
            return Err(Error::NoDevice);
        }
        Ok(avail as usize)
    }

    fn modem_bits(&self, set: bool, bits: libc::c_int) -> Result<()> {
        let action = if set { libc::TIOCMBIS } else { libc::TIOCMBIC };
        let state = bits;
        if unsafe { libc::ioctl(self.fd, action, &state) } == -1 {
            return Err(Error::NoDevice);
        }
        Ok(())
    }

    /// Drive the RTS line.
    pub fn set_rts(&self, on: bool) -> Result<()> {
        self.modem_bits(on, libc::TIOCM_RTS)
    }

    /// Drive the DTR line.
    pub fn set_dtr(&self, on: bool) -> Result<()> {
        self.modem_bits(on, libc::TIOCM_DTR)
    }

    /// Clear both PTT-capable lines; done before and after sessions so a
    /// freshly opened port cannot key the transmitter.
    pub fn clear_modem_lines(&self) -> Result<()> {
        self.modem_bits(false, libc::TIOCM_RTS | libc::TIOCM_DTR)
    }

    /// Read the RTS state back.
    pub fn rts(&self) -> Result<bool> {
        let mut state: libc::c_int = 0;
        if unsafe { libc::ioctl(self.fd, libc::TIOCMGET, &mut state) } == -1 {
            return Err(Error::NoDevice);
        }
        Ok(state & libc::TIOCM_RTS != 0)
    }

    /// Read the CTS state.
    pub fn cts(&self) -> Result<bool> {
        let mut state: libc::c_int = 0;
        if unsafe { libc::ioctl(self.fd, libc::TIOCMGET, &mut state) } == -1 {
            return Err(Error::NoDevice);
        }
        Ok(state & libc::TIOCM_CTS != 0)
    }

    /// Flow-control mode the port was opened with.
    #[must_use]
    pub fn flow(&self) -> Flow {
        self.flow
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_mapping_rounds_up_to_supported_rates() {
        assert_eq!(rate_to_macro(45), Some(libc::B50));
        assert_eq!(rate_to_macro(4_800), Some(libc::B4800));
        assert_eq!(rate_to_macro(9_600), Some(libc::B9600));
        assert_eq!(rate_to_macro(10_000_000), None);
    }

    #[test]
    fn config_presets() {
        let rc = SerialConfig::rig_control("/dev/ttyU0", 4_800);
        assert_eq!(rc.data_bits, DataBits::Eight);
        assert_eq!(rc.stop_bits, StopBits::One);
        let fsk = SerialConfig::fsk_keying("/dev/ttyU1", 45);
        assert_eq!(fsk.data_bits, DataBits::Five);
        assert_eq!(fsk.stop_bits, StopBits::OnePointFive);
        assert_eq!(fsk.parity, Parity::None);
    }

    #[test]
    fn opening_a_missing_device_fails() {
        let cfg = SerialConfig::rig_control("/nonexistent/tty", 4_800);
        assert!(SerialPort::open(&cfg).is_err());
    }
}
