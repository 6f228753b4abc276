//! Wire payloads exchanged between sites: a fixed magic header, one kind
//! byte, then length-prefixed little-endian arrays. Pinning the byte layout
//! keeps the protocol stable across sites built from different versions.

use crate::model::store::LocalMeans;
use crate::protocol::ProtocolError;

const MAGIC: [u8; 4] = *b"FQN1";

const KIND_Q_LOCAL_MEANS: u8 = 1;
const KIND_Q_GLOBAL_MEANS: u8 = 2;
const KIND_UQ_LOCAL_ZEROS: u8 = 3;
const KIND_UQ_GLOBAL_ZEROS: u8 = 4;
const KIND_UQ_LOCAL_FACTORS: u8 = 5;
const KIND_UQ_SCALING_FACTOR: u8 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    QLocalMeans(LocalMeans),
    QGlobalMeans(Vec<f64>),
    UqLocalZeros(Vec<u64>),
    UqGlobalZeros(Vec<u64>),
    UqLocalFactors(Vec<f64>),
    UqScalingFactor(f64),
}

impl Payload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::QLocalMeans(_) => "local means",
            Payload::QGlobalMeans(_) => "global means",
            Payload::UqLocalZeros(_) => "local zero rows",
            Payload::UqGlobalZeros(_) => "global zero rows",
            Payload::UqLocalFactors(_) => "local upper quartile factors",
            Payload::UqScalingFactor(_) => "scaling factor",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        match self {
            Payload::QLocalMeans(means) => {
                out.push(KIND_Q_LOCAL_MEANS);
                write_u64(&mut out, means.m_eff);
                write_f64_vec(&mut out, &means.sums);
            }
            Payload::QGlobalMeans(means) => {
                out.push(KIND_Q_GLOBAL_MEANS);
                write_f64_vec(&mut out, means);
            }
            Payload::UqLocalZeros(rows) => {
                out.push(KIND_UQ_LOCAL_ZEROS);
                write_u64_vec(&mut out, rows);
            }
            Payload::UqGlobalZeros(rows) => {
                out.push(KIND_UQ_GLOBAL_ZEROS);
                write_u64_vec(&mut out, rows);
            }
            Payload::UqLocalFactors(factors) => {
                out.push(KIND_UQ_LOCAL_FACTORS);
                write_f64_vec(&mut out, factors);
            }
            Payload::UqScalingFactor(factor) => {
                out.push(KIND_UQ_SCALING_FACTOR);
                write_f64(&mut out, *factor);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Payload, ProtocolError> {
        let mut reader = Reader { buf: bytes, pos: 0 };
        let magic = reader.bytes(4)?;
        if magic != MAGIC.as_slice() {
            return Err(ProtocolError::BadMagic);
        }
        let kind = reader.u8()?;
        let payload = match kind {
            KIND_Q_LOCAL_MEANS => {
                let m_eff = reader.u64()?;
                let sums = reader.f64_vec()?;
                Payload::QLocalMeans(LocalMeans { m_eff, sums })
            }
            KIND_Q_GLOBAL_MEANS => Payload::QGlobalMeans(reader.f64_vec()?),
            KIND_UQ_LOCAL_ZEROS => Payload::UqLocalZeros(reader.u64_vec()?),
            KIND_UQ_GLOBAL_ZEROS => Payload::UqGlobalZeros(reader.u64_vec()?),
            KIND_UQ_LOCAL_FACTORS => Payload::UqLocalFactors(reader.f64_vec()?),
            KIND_UQ_SCALING_FACTOR => Payload::UqScalingFactor(reader.f64()?),
            other => return Err(ProtocolError::UnknownKind(other)),
        };
        if reader.pos != bytes.len() {
            return Err(ProtocolError::TrailingBytes);
        }
        Ok(payload)
    }
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_f64(out: &mut Vec<u8>, v: f64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_u64_vec(out: &mut Vec<u8>, values: &[u64]) {
    write_u64(out, values.len() as u64);
    for &v in values {
        write_u64(out, v);
    }
}

fn write_f64_vec(out: &mut Vec<u8>, values: &[f64]) {
    write_u64(out, values.len() as u64);
    for &v in values {
        write_f64(out, v);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.pos + len > self.buf.len() {
            return Err(ProtocolError::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.bytes(1)?[0])
    }

    fn u64(&mut self) -> Result<u64, ProtocolError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn f64(&mut self) -> Result<f64, ProtocolError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.bytes(8)?);
        Ok(f64::from_le_bytes(buf))
    }

    fn len(&mut self) -> Result<usize, ProtocolError> {
        let len = self.u64()?;
        // An honest length can never exceed the remaining bytes / 8.
        if len > (self.buf.len() - self.pos) as u64 / 8 {
            return Err(ProtocolError::Truncated);
        }
        Ok(len as usize)
    }

    fn u64_vec(&mut self) -> Result<Vec<u64>, ProtocolError> {
        let len = self.len()?;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.u64()?);
        }
        Ok(out)
    }

    fn f64_vec(&mut self) -> Result<Vec<f64>, ProtocolError> {
        let len = self.len()?;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.f64()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/protocol/payload.rs"]
mod tests;
