//! Connected clients and their buffered movement input.
//!
//! Tracks who is connected (connect, disconnect, timeout), keeps each
//! client's input frames in sequence order, and remembers the last frame
//! applied so clients can reconcile their predictions. Fire requests never
//! pass through here; they only refresh the sender's activity.

use log::{debug, info};
use shared::CharacterInput;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Clients silent for longer than this are dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered frames per client beyond which the oldest are discarded.
pub const MAX_PENDING_INPUTS: usize = 120;

#[derive(Debug)]
pub struct Client {
    pub id: u32,
    pub addr: SocketAddr,
    /// Last packet of any kind, fire requests included.
    pub last_seen: Instant,
    /// Highest input sequence applied to the simulation.
    pub last_processed_input: u32,
    /// Unapplied frames, ascending by sequence.
    pub pending_inputs: Vec<CharacterInput>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_processed_input: 0,
            pending_inputs: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Buffers a frame in sequence order.
    ///
    /// Frames already applied or already buffered are dropped, so duplicated
    /// and reordered datagrams are harmless. Returns false when dropped.
    pub fn add_input(&mut self, input: CharacterInput) -> bool {
        self.touch();

        if input.sequence <= self.last_processed_input {
            debug!(
                "Client {} sent stale input {} (processed {})",
                self.id, input.sequence, self.last_processed_input
            );
            return false;
        }

        let Err(index) = self
            .pending_inputs
            .binary_search_by_key(&input.sequence, |pending| pending.sequence)
        else {
            return false;
        };

        self.pending_inputs.insert(index, input);
        if self.pending_inputs.len() > MAX_PENDING_INPUTS {
            self.pending_inputs.remove(0);
        }
        true
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Connection roster with a capacity limit. Ids start at 1 and are never
/// reused within a server run.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers `addr`, or returns None when the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));
        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        match self.clients.remove(client_id) {
            Some(client) => {
                info!("Client {} disconnected", client.id);
                true
            }
            None => false,
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    /// Returns false for unknown clients and dropped frames.
    pub fn add_input(&mut self, client_id: u32, input: CharacterInput) -> bool {
        self.clients
            .get_mut(&client_id)
            .is_some_and(|client| client.add_input(input))
    }

    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
    }

    /// Every unapplied frame across clients, ordered by client timestamp.
    pub fn get_chronological_inputs(&self) -> Vec<(u32, CharacterInput)> {
        let mut all_inputs: Vec<(u32, CharacterInput)> = self
            .clients
            .values()
            .flat_map(|client| {
                client
                    .pending_inputs
                    .iter()
                    .filter(|input| input.sequence > client.last_processed_input)
                    .map(|input| (client.id, *input))
            })
            .collect();

        all_inputs.sort_by_key(|(_, input)| input.timestamp);
        all_inputs
    }

    /// Acknowledges `sequence`. Acks never move backwards.
    pub fn mark_input_processed(&mut self, client_id: u32, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = client.last_processed_input.max(sequence);
        }
    }

    pub fn cleanup_processed_inputs(&mut self) {
        for client in self.clients.values_mut() {
            let acked = client.last_processed_input;
            client.pending_inputs.retain(|input| input.sequence > acked);
        }
    }

    /// Per-client acks, embedded in every snapshot for reconciliation.
    pub fn get_last_processed_inputs(&self) -> HashMap<u32, u32> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.last_processed_input))
            .collect()
    }

    /// Drops clients silent for longer than [`CLIENT_TIMEOUT`] and returns
    /// their ids so their characters can be despawned.
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|client| client.id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }
        timed_out
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
