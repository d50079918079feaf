//! Command dispatcher: parse one datagram, validate the sender, mutate the
//! registries, emit replies.
//!
//! Workers call [`Dispatcher::handle`] once per datagram. Handling is
//! unordered across datagrams (even from the same sender), so every handler
//! treats a missing sender as "already gone" and returns silently. All
//! mutation happens under the client write lock; room commands additionally
//! take the room mutex, always in that order (see [`crate::state`]).

use std::net::SocketAddrV4;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;

use crate::client::ClientId;
use crate::clock;
use crate::endpoint::Outbound;
use crate::registry::Registry;
use crate::state::{self, ServerState};
use crate::stats::ServerStats;
use crate::wire::{self, Channel, Command};

/// Frame and send one datagram; a failed send is logged and counted, never
/// propagated — a lost datagram is a normal occurrence on UDP.
pub(crate) fn send_one(
    out: &dyn Outbound,
    stats: &ServerStats,
    addr: SocketAddrV4,
    channel: Channel,
    text: &str,
) {
    let buf = wire::frame(channel, text);
    if let Err(e) = out.send_to(addr, &buf) {
        stats.sends_failed.fetch_add(1, Relaxed);
        tracing::warn!("send to {addr} failed: {e}");
    }
}

pub struct Dispatcher {
    state: Arc<ServerState>,
    out: Arc<dyn Outbound>,
    admin_port: u16,
}

impl Dispatcher {
    pub fn new(state: Arc<ServerState>, out: Arc<dyn Outbound>, admin_port: u16) -> Self {
        Self {
            state,
            out,
            admin_port,
        }
    }

    /// Handle one received datagram to completion.
    pub fn handle(&self, src: SocketAddrV4, payload: &[u8]) {
        let stats = &self.state.stats;
        stats.datagrams_received.fetch_add(1, Relaxed);

        let Some(cmd) = wire::parse(payload) else {
            stats.datagrams_malformed.fetch_add(1, Relaxed);
            return;
        };

        if let Command::Conn { name } = cmd {
            self.conn(src, name);
            stats.commands_handled.fetch_add(1, Relaxed);
            return;
        }

        let mut reg = self.state.clients_write();

        // Any valid datagram from a known client counts as activity, even if
        // the command below is otherwise ignored.
        let sender = reg.find_by_addr(src);
        if let Some(id) = sender {
            reg.touch(id, clock::now_ms());
        }

        match cmd {
            Command::Conn { .. } => unreachable!("handled above"),
            Command::Disconn => self.disconn(&mut reg, sender),
            Command::Say { text } => self.say(&mut reg, sender, text),
            Command::SayTo { recipient, text } => self.sayto(&reg, sender, recipient, text),
            Command::Mute { target } => self.mute(&mut reg, sender, target),
            Command::Unmute { target } => self.unmute(&mut reg, sender, target),
            Command::Rename { new_name } => self.rename(&mut reg, sender, new_name),
            Command::Kick { target } => self.kick(&mut reg, src, target),
            Command::CreateRoom { name } => self.createroom(&mut reg, sender, name),
            Command::JoinRoom { name } => self.joinroom(&mut reg, sender, name),
            Command::SayRoom { text } => self.sayroom(&mut reg, sender, text),
            Command::LeaveRoom => self.leaveroom(&mut reg, sender),
            Command::KickRoom { target } => self.kickroom(&mut reg, src, target),
            // The activity touch above is the entire effect of a pong.
            Command::RePing => {}
        }
        stats.commands_handled.fetch_add(1, Relaxed);
    }

    fn send(&self, addr: SocketAddrV4, channel: Channel, text: &str) {
        send_one(self.out.as_ref(), &self.state.stats, addr, channel, text);
    }

    /// Server-sentence reply; these always travel on the global channel.
    fn reply(&self, addr: SocketAddrV4, text: &str) {
        self.send(addr, Channel::Global, text);
    }

    fn conn(&self, src: SocketAddrV4, name: &str) {
        let mut reg = self.state.clients_write();
        if reg.add(src, name, clock::now_ms()).is_err() {
            // Name or address taken, or the name is unusable
            return;
        }
        self.state.stats.connects.fetch_add(1, Relaxed);
        self.reply(src, &format!("[Server] {name} successfully connected"));
        // Replay the global backlog, one datagram per stored line
        for line in reg.history.iter() {
            self.send(src, Channel::Global, line);
        }
    }

    fn disconn(&self, reg: &mut Registry, sender: Option<ClientId>) {
        // A second disconn from the same address finds no sender: no-op.
        let Some(id) = sender else { return };
        let Some(addr) = reg.client(id).map(|c| c.addr) else {
            return;
        };
        self.reply(addr, "[Server] Disconnected. Bye!");
        let mut rooms = self.state.rooms_lock();
        state::remove_client(reg, &mut rooms, id);
        self.state.stats.disconnects.fetch_add(1, Relaxed);
    }

    fn say(&self, reg: &mut Registry, sender: Option<ClientId>, text: &str) {
        let Some(name) = sender.and_then(|id| reg.client(id)).map(|c| c.name.clone()) else {
            return;
        };
        let msg = format!("[{name}] {text}");
        reg.history.append(&msg);
        self.state.stats.messages_global.fetch_add(1, Relaxed);
        for (_, c) in reg.iter() {
            if c.is_muted(&name) {
                continue;
            }
            self.send(c.addr, Channel::Global, &msg);
        }
    }

    fn sayto(&self, reg: &Registry, sender: Option<ClientId>, recipient: &str, text: &str) {
        let Some(name) = sender.and_then(|id| reg.client(id)).map(|c| c.name.clone()) else {
            return;
        };
        // Unknown recipient and muted sender both drop silently; the sender
        // is not told either way.
        let Some(r) = reg.find_by_name(recipient).and_then(|id| reg.client(id)) else {
            return;
        };
        if r.is_muted(&name) {
            return;
        }
        self.state.stats.messages_private.fetch_add(1, Relaxed);
        self.send(r.addr, Channel::Private, &format!("[{name}] {text}"));
    }

    fn mute(&self, reg: &mut Registry, sender: Option<ClientId>, target: &str) {
        // Silent either way: duplicate and full-list failures included
        if let Some(c) = sender.and_then(|id| reg.client_mut(id)) {
            c.mute(target);
        }
    }

    fn unmute(&self, reg: &mut Registry, sender: Option<ClientId>, target: &str) {
        if let Some(c) = sender.and_then(|id| reg.client_mut(id)) {
            c.unmute(target);
        }
    }

    fn rename(&self, reg: &mut Registry, sender: Option<ClientId>, new_name: &str) {
        let Some(id) = sender else { return };
        // Collision or bad name: silent failure
        if reg.rename(id, new_name) {
            if let Some(c) = reg.client(id) {
                self.reply(c.addr, &format!("[Server] You are now known as {new_name}"));
            }
        }
    }

    fn kick(&self, reg: &mut Registry, src: SocketAddrV4, target: &str) {
        if src.port() != self.admin_port {
            self.reply(src, "[Server] You are not an admin");
            return;
        }
        let Some(tid) = reg.find_by_name(target) else {
            self.reply(src, &format!("[Server] User {target} not found"));
            return;
        };
        let Some(taddr) = reg.client(tid).map(|c| c.addr) else {
            return;
        };
        self.reply(taddr, "[Server] You have been removed from the chat");
        {
            let mut rooms = self.state.rooms_lock();
            state::remove_client(reg, &mut rooms, tid);
        }
        self.state.stats.kicks.fetch_add(1, Relaxed);
        let msg = format!("[Server] {target} has been removed from the chat");
        for (_, c) in reg.iter() {
            self.send(c.addr, Channel::Global, &msg);
        }
    }

    fn createroom(&self, reg: &mut Registry, sender: Option<ClientId>, name: &str) {
        let Some(id) = sender else { return };
        let Some(addr) = reg.client(id).map(|c| c.addr) else {
            return;
        };
        if reg.client(id).and_then(|c| c.room.as_ref()).is_some() {
            self.reply(addr, "[Server] You are already in a room");
            return;
        }
        if !wire::valid_name(name) {
            self.reply(addr, "[Server] Invalid room name");
            return;
        }
        let mut rooms = self.state.rooms_lock();
        let Some(room) = rooms.insert(name) else {
            self.reply(addr, &format!("[Server] Room {name} already exists"));
            return;
        };
        room.add_member(id);
        if let Some(c) = reg.client_mut(id) {
            c.room = Some(name.to_owned());
        }
        drop(rooms);
        self.reply(addr, &format!("[Server] Room {name} created; you joined it"));
    }

    fn joinroom(&self, reg: &mut Registry, sender: Option<ClientId>, name: &str) {
        let Some(id) = sender else { return };
        let Some(addr) = reg.client(id).map(|c| c.addr) else {
            return;
        };
        if reg.client(id).and_then(|c| c.room.as_ref()).is_some() {
            self.reply(addr, "[Server] You are already in a room");
            return;
        }
        let mut rooms = self.state.rooms_lock();
        let Some(room) = rooms.find_mut(name) else {
            self.reply(addr, "[Server] Room not found");
            return;
        };
        room.add_member(id);
        if let Some(c) = reg.client_mut(id) {
            c.room = Some(name.to_owned());
        }
        // Replay this room's backlog before confirming the join
        for line in room.history.iter() {
            self.send(addr, Channel::Room, line);
        }
        drop(rooms);
        self.reply(addr, &format!("[Server] Joined room {name}"));
    }

    fn sayroom(&self, reg: &mut Registry, sender: Option<ClientId>, text: &str) {
        let Some(id) = sender else { return };
        let Some(c) = reg.client(id) else { return };
        let addr = c.addr;
        let name = c.name.clone();
        let Some(room_name) = c.room.clone() else {
            self.reply(addr, "[Server] You are not in a room");
            return;
        };
        let mut rooms = self.state.rooms_lock();
        let Some(room) = rooms.find_mut(&room_name) else {
            return;
        };
        let msg = format!("[{room_name}|{name}] {text}");
        room.history.append(&msg);
        self.state.stats.messages_room.fetch_add(1, Relaxed);
        for &mid in room.members() {
            let Some(m) = reg.client(mid) else { continue };
            if m.is_muted(&name) {
                continue;
            }
            self.send(m.addr, Channel::Room, &msg);
        }
    }

    fn leaveroom(&self, reg: &mut Registry, sender: Option<ClientId>) {
        let Some(id) = sender else { return };
        let Some(addr) = reg.client(id).map(|c| c.addr) else {
            return;
        };
        let mut rooms = self.state.rooms_lock();
        match state::detach_from_room(reg, &mut rooms, id) {
            Some(room_name) => {
                drop(rooms);
                self.reply(addr, &format!("[Server] You left room {room_name}"));
            }
            None => {
                drop(rooms);
                self.reply(addr, "[Server] You are not in a room");
            }
        }
    }

    fn kickroom(&self, reg: &mut Registry, src: SocketAddrV4, target: &str) {
        if src.port() != self.admin_port {
            self.reply(src, "[Server] You are not an admin");
            return;
        }
        let Some(tid) = reg.find_by_name(target) else {
            self.reply(src, &format!("[Server] User {target} not found"));
            return;
        };
        let Some(taddr) = reg.client(tid).map(|c| c.addr) else {
            return;
        };
        let mut rooms = self.state.rooms_lock();
        match state::detach_from_room(reg, &mut rooms, tid) {
            Some(room_name) => {
                drop(rooms);
                self.reply(taddr, &format!("[Server] You have been removed from room {room_name}"));
                self.reply(src, &format!("[Server] {target} was removed from room {room_name}"));
            }
            None => {
                drop(rooms);
                self.reply(src, &format!("[Server] {target} is not in a room"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    /// Collects every outgoing datagram instead of touching a socket.
    #[derive(Default)]
    struct MockOutbound {
        sent: Mutex<Vec<(SocketAddrV4, Vec<u8>)>>,
    }

    impl Outbound for MockOutbound {
        fn send_to(&self, addr: SocketAddrV4, payload: &[u8]) -> io::Result<()> {
            self.sent.lock().unwrap().push((addr, payload.to_vec()));
            Ok(())
        }
    }

    impl MockOutbound {
        /// Frames delivered to `addr`, decoded as (channel_byte, text).
        fn lines_to(&self, addr: SocketAddrV4) -> Vec<(u8, String)> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(a, _)| *a == addr)
                .map(|(_, buf)| {
                    assert_eq!(*buf.last().unwrap(), 0, "reply not NUL-terminated");
                    let text = std::str::from_utf8(&buf[1..buf.len() - 1]).unwrap();
                    assert!(text.ends_with('\n'), "reply missing newline");
                    (buf[0], text.trim_end_matches('\n').to_owned())
                })
                .collect()
        }

        fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }
    }

    fn addr(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new([127, 0, 0, 1].into(), port)
    }

    fn setup() -> (Arc<ServerState>, Arc<MockOutbound>, Dispatcher) {
        let state = Arc::new(ServerState::new());
        let out = Arc::new(MockOutbound::default());
        let dispatcher = Dispatcher::new(state.clone(), out.clone(), wire::DEFAULT_ADMIN_PORT);
        (state, out, dispatcher)
    }

    #[test]
    fn test_conn_replays_global_history() {
        let (_state, out, d) = setup();
        let alice = addr(40001);
        let bob = addr(40002);

        d.handle(alice, b"conn$alice");
        d.handle(alice, b"say$hi");
        d.handle(bob, b"conn$bob");

        let to_bob = out.lines_to(bob);
        assert_eq!(
            to_bob,
            vec![
                (0x00, "[Server] bob successfully connected".to_owned()),
                (0x00, "[alice] hi".to_owned()),
            ]
        );
        let to_alice = out.lines_to(alice);
        assert!(to_alice.contains(&(0x00, "[alice] hi".to_owned())));
    }

    #[test]
    fn test_conn_duplicate_name_fails_silently() {
        let (state, out, d) = setup();
        d.handle(addr(40001), b"conn$alice");
        out.clear();
        d.handle(addr(40002), b"conn$alice");
        assert!(out.lines_to(addr(40002)).is_empty());
        assert_eq!(state.clients_read().len(), 1);
    }

    #[test]
    fn test_mute_blocks_say_and_sayto() {
        let (_state, out, d) = setup();
        let alice = addr(40001);
        let bob = addr(40002);
        d.handle(alice, b"conn$alice");
        d.handle(bob, b"conn$bob");
        d.handle(bob, b"mute$alice");
        out.clear();

        d.handle(alice, b"say$hello all");
        d.handle(alice, b"sayto$bob psst");

        assert!(out.lines_to(bob).is_empty());
        assert_eq!(out.lines_to(alice), vec![(0x00, "[alice] hello all".to_owned())]);

        // Unmute restores delivery
        d.handle(bob, b"unmute$alice");
        out.clear();
        d.handle(alice, b"sayto$bob psst");
        assert_eq!(out.lines_to(bob), vec![(0x02, "[alice] psst".to_owned())]);
    }

    #[test]
    fn test_sayroom_respects_mute() {
        let (_state, out, d) = setup();
        let alice = addr(40001);
        let bob = addr(40002);
        let carol = addr(40003);
        d.handle(alice, b"conn$alice");
        d.handle(bob, b"conn$bob");
        d.handle(carol, b"conn$carol");
        d.handle(alice, b"createroom$lounge");
        d.handle(bob, b"joinroom$lounge");
        d.handle(carol, b"joinroom$lounge");
        d.handle(bob, b"mute$alice");
        out.clear();

        d.handle(alice, b"sayroom$hey");
        // The muted member receives nothing; everyone else in the room does
        assert!(out.lines_to(bob).is_empty());
        assert_eq!(out.lines_to(alice), vec![(0x01, "[lounge|alice] hey".to_owned())]);
        assert_eq!(out.lines_to(carol), vec![(0x01, "[lounge|alice] hey".to_owned())]);
    }

    #[test]
    fn test_rename_collision_is_silent() {
        let (state, out, d) = setup();
        let alice = addr(40001);
        d.handle(alice, b"conn$alice");
        d.handle(addr(40002), b"conn$bob");
        out.clear();

        d.handle(alice, b"rename$bob");
        assert!(out.lines_to(alice).is_empty());
        assert!(state.clients_read().find_by_name("alice").is_some());

        d.handle(alice, b"rename$carol");
        assert_eq!(
            out.lines_to(alice),
            vec![(0x00, "[Server] You are now known as carol".to_owned())]
        );
        let reg = state.clients_read();
        assert!(reg.find_by_name("carol").is_some());
        assert!(reg.find_by_name("alice").is_none());
    }

    #[test]
    fn test_room_lifecycle() {
        let (state, out, d) = setup();
        let alice = addr(40001);
        let bob = addr(40002);
        d.handle(alice, b"conn$alice");
        d.handle(bob, b"conn$bob");

        d.handle(alice, b"createroom$lounge");
        d.handle(bob, b"joinroom$lounge");
        out.clear();

        d.handle(alice, b"sayroom$hey");
        assert_eq!(out.lines_to(alice), vec![(0x01, "[lounge|alice] hey".to_owned())]);
        assert_eq!(out.lines_to(bob), vec![(0x01, "[lounge|alice] hey".to_owned())]);

        out.clear();
        d.handle(bob, b"leaveroom$");
        d.handle(alice, b"leaveroom$");
        assert_eq!(out.lines_to(bob), vec![(0x00, "[Server] You left room lounge".to_owned())]);
        assert!(state.rooms_lock().is_empty());

        // The room is gone for good
        out.clear();
        d.handle(bob, b"joinroom$lounge");
        assert_eq!(out.lines_to(bob), vec![(0x00, "[Server] Room not found".to_owned())]);
    }

    #[test]
    fn test_joinroom_replays_room_history() {
        let (_state, out, d) = setup();
        let alice = addr(40001);
        let bob = addr(40002);
        d.handle(alice, b"conn$alice");
        d.handle(bob, b"conn$bob");
        d.handle(alice, b"createroom$lounge");
        d.handle(alice, b"sayroom$first");
        d.handle(alice, b"sayroom$second");
        out.clear();

        d.handle(bob, b"joinroom$lounge");
        assert_eq!(
            out.lines_to(bob),
            vec![
                (0x01, "[lounge|alice] first".to_owned()),
                (0x01, "[lounge|alice] second".to_owned()),
                (0x00, "[Server] Joined room lounge".to_owned()),
            ]
        );
    }

    #[test]
    fn test_createroom_while_in_room_is_refused() {
        let (_state, out, d) = setup();
        let alice = addr(40001);
        d.handle(alice, b"conn$alice");
        d.handle(alice, b"createroom$lounge");
        out.clear();
        d.handle(alice, b"createroom$kitchen");
        assert_eq!(
            out.lines_to(alice),
            vec![(0x00, "[Server] You are already in a room".to_owned())]
        );
    }

    #[test]
    fn test_admin_kick() {
        let (state, out, d) = setup();
        let alice = addr(40001);
        let bob = addr(40002);
        let admin = addr(wire::DEFAULT_ADMIN_PORT);
        d.handle(alice, b"conn$alice");
        d.handle(bob, b"conn$bob");

        // Non-admin senders are refused
        out.clear();
        d.handle(alice, b"kick$bob");
        assert_eq!(out.lines_to(alice), vec![(0x00, "[Server] You are not an admin".to_owned())]);
        assert!(state.clients_read().find_by_name("bob").is_some());

        out.clear();
        d.handle(admin, b"kick$bob");
        assert_eq!(
            out.lines_to(bob),
            vec![(0x00, "[Server] You have been removed from the chat".to_owned())]
        );
        assert_eq!(
            out.lines_to(alice),
            vec![(0x00, "[Server] bob has been removed from the chat".to_owned())]
        );
        assert!(state.clients_read().find_by_name("bob").is_none());

        // The name is free again
        out.clear();
        d.handle(addr(40003), b"conn$bob");
        assert_eq!(
            out.lines_to(addr(40003)),
            vec![(0x00, "[Server] bob successfully connected".to_owned())]
        );
    }

    #[test]
    fn test_kickroom_detaches_target_only() {
        let (state, out, d) = setup();
        let alice = addr(40001);
        let bob = addr(40002);
        let admin = addr(wire::DEFAULT_ADMIN_PORT);
        d.handle(alice, b"conn$alice");
        d.handle(bob, b"conn$bob");
        d.handle(alice, b"createroom$lounge");
        d.handle(bob, b"joinroom$lounge");
        out.clear();

        d.handle(admin, b"kickroom$bob");
        assert_eq!(
            out.lines_to(bob),
            vec![(0x00, "[Server] You have been removed from room lounge".to_owned())]
        );
        assert_eq!(
            out.lines_to(admin),
            vec![(0x00, "[Server] bob was removed from room lounge".to_owned())]
        );
        let reg = state.clients_read();
        let bob_id = reg.find_by_name("bob").unwrap();
        assert!(reg.client(bob_id).unwrap().room.is_none());
        // bob himself is still connected, and the room survives with alice
        assert!(state.rooms_lock().find("lounge").is_some());
    }

    #[test]
    fn test_disconn_is_idempotent() {
        let (state, out, d) = setup();
        let alice = addr(40001);
        d.handle(alice, b"conn$alice");
        out.clear();

        d.handle(alice, b"disconn$");
        assert_eq!(out.lines_to(alice), vec![(0x00, "[Server] Disconnected. Bye!".to_owned())]);
        assert!(state.clients_read().is_empty());

        out.clear();
        d.handle(alice, b"disconn$");
        assert!(out.lines_to(alice).is_empty());
        assert_eq!(state.stats.disconnects.load(Relaxed), 1);
    }

    #[test]
    fn test_any_command_counts_as_activity() {
        let (state, _out, d) = setup();
        let alice = addr(40001);
        d.handle(alice, b"conn$alice");
        let (id, before) = {
            let reg = state.clients_read();
            let id = reg.find_by_addr(alice).unwrap();
            (id, reg.client(id).unwrap().last_active)
        };
        {
            let mut reg = state.clients_write();
            reg.mark_pinged(id, before);
        }

        d.handle(alice, b"re-ping$");
        let reg = state.clients_read();
        let c = reg.client(id).unwrap();
        assert!(c.last_active >= before);
        assert!(!c.awaiting_pong);
    }

    #[test]
    fn test_malformed_datagrams_are_counted_and_dropped() {
        let (state, out, d) = setup();
        d.handle(addr(40001), b"garbage");
        d.handle(addr(40001), b"shout$loud");
        d.handle(addr(40001), &[0xFF, 0xC0, b'$', b'x']);
        assert_eq!(state.stats.datagrams_malformed.load(Relaxed), 3);
        assert_eq!(state.stats.commands_handled.load(Relaxed), 0);
        assert!(out.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_say_from_unknown_sender_is_dropped() {
        let (state, out, d) = setup();
        d.handle(addr(40001), b"say$ghost message");
        assert!(out.sent.lock().unwrap().is_empty());
        assert_eq!(state.clients_read().history.len(), 0);
    }
}
