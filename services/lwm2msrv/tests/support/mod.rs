//! In-process Modbus TCP slave for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lwm2msrv::core::config::MappingConfig;

#[derive(Debug, Default)]
pub struct SlaveTables {
    pub coils: HashMap<u16, bool>,
    pub discrete_inputs: HashMap<u16, bool>,
    pub holding_registers: HashMap<u16, u16>,
    pub input_registers: HashMap<u16, u16>,
    /// Requests touching these start addresses answer ILLEGAL DATA ADDRESS
    pub faulty: HashSet<u16>,
    /// Raw request PDUs, in arrival order
    pub requests: Vec<Vec<u8>>,
}

#[derive(Clone)]
pub struct FakeSlave {
    pub addr: SocketAddr,
    tables: Arc<Mutex<SlaveTables>>,
}

impl FakeSlave {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let tables = Arc::new(Mutex::new(SlaveTables::default()));

        let shared = tables.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, shared.clone()));
            }
        });

        Self { addr, tables }
    }

    pub fn tables(&self) -> MutexGuard<'_, SlaveTables> {
        self.tables.lock().unwrap()
    }

    pub fn request_count(&self) -> usize {
        self.tables().requests.len()
    }

    /// Mapping file pointing at this slave
    pub fn mapping_json(&self, objects: &str) -> String {
        format!(
            r#"{{
                "connection": "tcp",
                "slave": 1,
                "tcpSettings": {{ "node": "127.0.0.1", "port": {}, "keepalive": false }},
                "objects": {}
            }}"#,
            self.addr.port(),
            objects
        )
    }

    pub fn mapping(&self, objects: &str) -> MappingConfig {
        MappingConfig::from_json_str(&self.mapping_json(objects)).unwrap()
    }
}

async fn serve(mut stream: TcpStream, tables: Arc<Mutex<SlaveTables>>) {
    loop {
        let mut header = [0u8; 7];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let len = usize::from(u16::from_be_bytes([header[4], header[5]]));
        let mut pdu = vec![0u8; len.saturating_sub(1)];
        if stream.read_exact(&mut pdu).await.is_err() {
            return;
        }

        let response = {
            let mut tables = tables.lock().unwrap();
            tables.requests.push(pdu.clone());
            handle(&mut tables, &pdu)
        };

        let mut frame = Vec::with_capacity(7 + response.len());
        frame.extend_from_slice(&header[0..4]);
        frame.extend_from_slice(&((response.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&response);
        if stream.write_all(&frame).await.is_err() {
            return;
        }
    }
}

fn word(pdu: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([pdu[at], pdu[at + 1]])
}

fn pack(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

fn handle(tables: &mut SlaveTables, pdu: &[u8]) -> Vec<u8> {
    let fc = pdu[0];
    let addr = word(pdu, 1);
    if tables.faulty.contains(&addr) {
        return vec![fc | 0x80, 0x02];
    }

    match fc {
        0x01 | 0x02 => {
            let qty = word(pdu, 3);
            let table = if fc == 0x01 {
                &tables.coils
            } else {
                &tables.discrete_inputs
            };
            let bits: Vec<bool> = (0..qty)
                .map(|i| table.get(&(addr + i)).copied().unwrap_or_default())
                .collect();
            let bytes = pack(&bits);
            let mut out = vec![fc, bytes.len() as u8];
            out.extend(bytes);
            out
        },
        0x03 | 0x04 => {
            let qty = word(pdu, 3);
            let table = if fc == 0x03 {
                &tables.holding_registers
            } else {
                &tables.input_registers
            };
            let mut out = vec![fc, (qty * 2) as u8];
            for i in 0..qty {
                let v = table.get(&(addr + i)).copied().unwrap_or_default();
                out.extend_from_slice(&v.to_be_bytes());
            }
            out
        },
        0x05 => {
            tables.coils.insert(addr, word(pdu, 3) == 0xFF00);
            pdu.to_vec()
        },
        0x06 => {
            tables.holding_registers.insert(addr, word(pdu, 3));
            pdu.to_vec()
        },
        0x0F => {
            let qty = word(pdu, 3);
            for i in 0..qty {
                let byte = pdu[6 + usize::from(i / 8)];
                tables.coils.insert(addr + i, byte & (1 << (i % 8)) != 0);
            }
            pdu[0..5].to_vec()
        },
        0x10 => {
            let qty = word(pdu, 3);
            for i in 0..qty {
                let v = word(pdu, 6 + usize::from(i) * 2);
                tables.holding_registers.insert(addr + i, v);
            }
            pdu[0..5].to_vec()
        },
        _ => vec![fc | 0x80, 0x01],
    }
}
