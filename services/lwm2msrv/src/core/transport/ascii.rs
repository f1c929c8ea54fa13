//! Modbus ASCII framing and master
//!
//! Frame layout: `:` + hex(slave, PDU, LRC) + `CR LF`, where the LRC is the
//! two's complement of the byte sum of slave and PDU. tokio-modbus has no
//! ASCII client, so the framing lives here as a tokio-util codec and the
//! master drives it over any byte stream (a serial port in production, an
//! in-memory duplex in tests).

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use std::time::Duration;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, warn};

use super::ModbusMaster;
use crate::error::{Lwm2mSrvError, Result};

const FRAME_START: u8 = b':';
const FRAME_END: &[u8] = b"\r\n";

/// 1 + 2 * (1 slave + 253 PDU + 1 LRC) + 2
pub const MAX_FRAME_LEN: usize = 513;

/// One decoded ASCII application data unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiAdu {
    pub slave: u8,
    pub pdu: Vec<u8>,
}

/// Problems with a single received frame; the stream stays usable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("invalid hex character 0x{0:02X}")]
    InvalidHex(u8),
    #[error("odd number of hex characters")]
    OddLength,
    #[error("frame too short")]
    TooShort,
    #[error("frame exceeds {MAX_FRAME_LEN} characters")]
    TooLarge,
    #[error("LRC mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    LrcMismatch { expected: u8, actual: u8 },
}

pub fn lrc(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)).wrapping_neg()
}

fn hex_digit(c: u8) -> std::result::Result<u8, FrameError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(FrameError::InvalidHex(c)),
    }
}

fn put_hex(dst: &mut BytesMut, byte: u8) {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    dst.put_u8(DIGITS[usize::from(byte >> 4)]);
    dst.put_u8(DIGITS[usize::from(byte & 0x0F)]);
}

fn parse_frame(body: &[u8]) -> std::result::Result<AsciiAdu, FrameError> {
    if body.len() % 2 != 0 {
        return Err(FrameError::OddLength);
    }

    let mut raw = Vec::with_capacity(body.len() / 2);
    for pair in body.chunks(2) {
        raw.push((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?);
    }
    // slave + function code + LRC at minimum
    if raw.len() < 3 {
        return Err(FrameError::TooShort);
    }

    let actual = raw.pop().unwrap_or_default();
    let expected = lrc(&raw);
    if expected != actual {
        return Err(FrameError::LrcMismatch { expected, actual });
    }

    Ok(AsciiAdu {
        slave: raw[0],
        pdu: raw[1..].to_vec(),
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AsciiCodec;

impl Decoder for AsciiCodec {
    type Item = std::result::Result<AsciiAdu, FrameError>;
    type Error = Lwm2mSrvError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // Drop line noise before the start character
        match src.iter().position(|&b| b == FRAME_START) {
            Some(0) => {},
            Some(pos) => src.advance(pos),
            None => {
                src.clear();
                return Ok(None);
            },
        }

        let end = match src.windows(FRAME_END.len()).position(|w| w == FRAME_END) {
            Some(end) => end,
            None => {
                if src.len() > MAX_FRAME_LEN {
                    src.clear();
                    return Ok(Some(Err(FrameError::TooLarge)));
                }
                return Ok(None);
            },
        };

        let frame = src.split_to(end + FRAME_END.len());
        Ok(Some(parse_frame(&frame[1..end])))
    }
}

impl Encoder<AsciiAdu> for AsciiCodec {
    type Error = Lwm2mSrvError;

    fn encode(&mut self, adu: AsciiAdu, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(5 + 2 * (adu.pdu.len() + 2));
        dst.put_u8(FRAME_START);
        put_hex(dst, adu.slave);
        let mut sum = adu.slave;
        for &b in &adu.pdu {
            put_hex(dst, b);
            sum = sum.wrapping_add(b);
        }
        put_hex(dst, sum.wrapping_neg());
        dst.put_slice(FRAME_END);
        Ok(())
    }
}

/// Request PDUs for the eight supported function codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    ReadCoils(u16, u16),
    ReadDiscreteInputs(u16, u16),
    ReadHoldingRegisters(u16, u16),
    ReadInputRegisters(u16, u16),
    WriteSingleCoil(u16, bool),
    WriteSingleRegister(u16, u16),
    WriteMultipleCoils(u16, &'a [bool]),
    WriteMultipleRegisters(u16, &'a [u16]),
}

impl Request<'_> {
    pub fn function_code(&self) -> u8 {
        match self {
            Request::ReadCoils(..) => 0x01,
            Request::ReadDiscreteInputs(..) => 0x02,
            Request::ReadHoldingRegisters(..) => 0x03,
            Request::ReadInputRegisters(..) => 0x04,
            Request::WriteSingleCoil(..) => 0x05,
            Request::WriteSingleRegister(..) => 0x06,
            Request::WriteMultipleCoils(..) => 0x0F,
            Request::WriteMultipleRegisters(..) => 0x10,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut pdu = BytesMut::with_capacity(8);
        pdu.put_u8(self.function_code());
        match self {
            Request::ReadCoils(addr, qty)
            | Request::ReadDiscreteInputs(addr, qty)
            | Request::ReadHoldingRegisters(addr, qty)
            | Request::ReadInputRegisters(addr, qty) => {
                pdu.put_u16(*addr);
                pdu.put_u16(*qty);
            },
            Request::WriteSingleCoil(addr, on) => {
                pdu.put_u16(*addr);
                pdu.put_u16(if *on { 0xFF00 } else { 0x0000 });
            },
            Request::WriteSingleRegister(addr, value) => {
                pdu.put_u16(*addr);
                pdu.put_u16(*value);
            },
            Request::WriteMultipleCoils(addr, coils) => {
                let packed = pack_bits(coils);
                pdu.put_u16(*addr);
                pdu.put_u16(coils.len() as u16);
                pdu.put_u8(packed.len() as u8);
                pdu.put_slice(&packed);
            },
            Request::WriteMultipleRegisters(addr, words) => {
                pdu.put_u16(*addr);
                pdu.put_u16(words.len() as u16);
                pdu.put_u8((words.len() * 2) as u8);
                for w in words.iter() {
                    pdu.put_u16(*w);
                }
            },
        }
        pdu.to_vec()
    }
}

/// LSB of the first byte is the first coil
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (i, _) in bits.iter().enumerate().filter(|(_, on)| **on) {
        packed[i / 8] |= 1 << (i % 8);
    }
    packed
}

pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0))
        .collect()
}

fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "server device failure",
        0x05 => "acknowledge",
        0x06 => "server device busy",
        0x08 => "memory parity error",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target device failed to respond",
        _ => "unknown exception",
    }
}

/// Check function code / exception and return the response body after it
fn response_body<'p>(function_code: u8, pdu: &'p [u8]) -> Result<&'p [u8]> {
    match pdu.first() {
        Some(&fc) if fc == function_code => Ok(&pdu[1..]),
        Some(&fc) if fc == function_code | 0x80 => {
            let code = pdu.get(1).copied().unwrap_or_default();
            Err(Lwm2mSrvError::operation(format!(
                "exception: 0x{:02X} ({})",
                code,
                exception_name(code)
            )))
        },
        Some(&fc) => Err(Lwm2mSrvError::operation(format!(
            "unexpected function code 0x{:02X} in response to 0x{:02X}",
            fc, function_code
        ))),
        None => Err(Lwm2mSrvError::operation("empty response")),
    }
}

fn byte_counted(body: &[u8], expected: usize) -> Result<&[u8]> {
    let count = body.first().map(|&c| usize::from(c));
    match count {
        Some(count) if count == expected && body.len() == expected + 1 => Ok(&body[1..]),
        _ => Err(Lwm2mSrvError::operation(format!(
            "malformed response: expected {} data bytes",
            expected
        ))),
    }
}

/// Modbus ASCII master over any async byte stream
pub struct AsciiMaster<T> {
    framed: Framed<T, AsciiCodec>,
}

impl<T> std::fmt::Debug for AsciiMaster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsciiMaster")
            .field("buffered", &self.framed.read_buffer().len())
            .finish()
    }
}

impl<T> AsciiMaster<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: T) -> Self {
        Self {
            framed: Framed::new(io, AsciiCodec),
        }
    }

    /// Send one request and wait for the matching slave's reply PDU
    async fn call(&mut self, slave: u8, request: Request<'_>) -> Result<Vec<u8>> {
        // Stale bytes from an abandoned exchange
        self.framed.read_buffer_mut().clear();

        self.framed
            .send(AsciiAdu {
                slave,
                pdu: request.encode(),
            })
            .await
            .map_err(|e| Lwm2mSrvError::operation(format!("transport: {}", e)))?;

        loop {
            match self.framed.next().await {
                None => return Err(Lwm2mSrvError::operation("transport: stream closed")),
                Some(Err(e)) => return Err(Lwm2mSrvError::operation(format!("transport: {}", e))),
                Some(Ok(Err(frame_err))) => {
                    warn!("Discarding ASCII frame: {}", frame_err);
                    return Err(Lwm2mSrvError::operation(format!(
                        "malformed response: {}",
                        frame_err
                    )));
                },
                Some(Ok(Ok(adu))) if adu.slave != slave => {
                    debug!("Ignoring frame from slave {}", adu.slave);
                },
                Some(Ok(Ok(adu))) => return Ok(adu.pdu),
            }
        }
    }

    async fn read_bits(&mut self, slave: u8, request: Request<'_>, qty: u16) -> Result<Vec<bool>> {
        let fc = request.function_code();
        let pdu = self.call(slave, request).await?;
        let body = response_body(fc, &pdu)?;
        let data = byte_counted(body, usize::from(qty).div_ceil(8))?;
        Ok(unpack_bits(data, usize::from(qty)))
    }

    async fn read_words(&mut self, slave: u8, request: Request<'_>, qty: u16) -> Result<Vec<u16>> {
        let fc = request.function_code();
        let pdu = self.call(slave, request).await?;
        let body = response_body(fc, &pdu)?;
        let data = byte_counted(body, usize::from(qty) * 2)?;
        Ok(data
            .chunks_exact(2)
            .map(|w| u16::from_be_bytes([w[0], w[1]]))
            .collect())
    }

    /// Writes echo address and value/quantity in four bytes
    async fn write(&mut self, slave: u8, request: Request<'_>) -> Result<()> {
        let fc = request.function_code();
        let pdu = self.call(slave, request).await?;
        let body = response_body(fc, &pdu)?;
        if body.len() != 4 {
            return Err(Lwm2mSrvError::operation(
                "malformed response: write echo must be 4 bytes",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<T> ModbusMaster for AsciiMaster<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_coils(&mut self, slave: u8, addr: u16, qty: u16) -> Result<Vec<bool>> {
        self.read_bits(slave, Request::ReadCoils(addr, qty), qty)
            .await
    }

    async fn read_discrete_inputs(
        &mut self,
        slave: u8,
        addr: u16,
        qty: u16,
    ) -> Result<Vec<bool>> {
        self.read_bits(slave, Request::ReadDiscreteInputs(addr, qty), qty)
            .await
    }

    async fn read_holding_registers(
        &mut self,
        slave: u8,
        addr: u16,
        qty: u16,
    ) -> Result<Vec<u16>> {
        self.read_words(slave, Request::ReadHoldingRegisters(addr, qty), qty)
            .await
    }

    async fn read_input_registers(&mut self, slave: u8, addr: u16, qty: u16) -> Result<Vec<u16>> {
        self.read_words(slave, Request::ReadInputRegisters(addr, qty), qty)
            .await
    }

    async fn write_single_coil(&mut self, slave: u8, addr: u16, value: bool) -> Result<()> {
        self.write(slave, Request::WriteSingleCoil(addr, value))
            .await
    }

    async fn write_multiple_coils(&mut self, slave: u8, addr: u16, values: &[bool]) -> Result<()> {
        self.write(slave, Request::WriteMultipleCoils(addr, values))
            .await
    }

    async fn write_single_register(&mut self, slave: u8, addr: u16, value: u16) -> Result<()> {
        self.write(slave, Request::WriteSingleRegister(addr, value))
            .await
    }

    async fn write_multiple_registers(
        &mut self,
        slave: u8,
        addr: u16,
        values: &[u16],
    ) -> Result<()> {
        self.write(slave, Request::WriteMultipleRegisters(addr, values))
            .await
    }

    /// ASCII frames carry no transaction id; wait out one late reply
    async fn resync(&mut self, window: Duration) -> Result<()> {
        self.framed.read_buffer_mut().clear();
        match timeout(window, self.framed.next()).await {
            Ok(Some(Ok(frame))) => debug!("Dropped late ASCII reply: {:?}", frame),
            Ok(Some(Err(e))) => {
                return Err(Lwm2mSrvError::operation(format!("transport: {}", e)));
            },
            Ok(None) => return Err(Lwm2mSrvError::operation("transport: stream closed")),
            Err(_) => debug!("No late ASCII reply within {} ms", window.as_millis()),
        }
        self.framed.read_buffer_mut().clear();
        Ok(())
    }
}
