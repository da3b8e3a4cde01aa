//! Connection Dispatcher
//!
//! 受け付けたソケットを最小負荷のワーカーに割り当て、アクティブなセッションの集合を保持する。
//! セッション集合とワーカーごとの負荷は 1 つのロックで保護し、
//! 接続と切断が並行しても負荷カウンタの更新が失われないようにする。

use std::{
    collections::BTreeMap,
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use hiroba_shared::protocol::Packet;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::{
    BindError, GroupMember, GroupName, MessagePusher, Presence, SessionId, SessionState,
    Username,
};

use super::{
    handler::PacketHandler,
    session::{SessionHandle, SessionTask},
    worker::Worker,
};

/// Where a new session goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Start another worker
    Spawn,
    /// Reuse the worker at this index
    Reuse(usize),
}

/// Index of the least-loaded worker; ties go to the first one found.
pub fn least_loaded(loads: &[usize]) -> Option<usize> {
    loads
        .iter()
        .enumerate()
        .min_by_key(|(_, load)| **load)
        .map(|(index, _)| index)
}

/// Workers are created lazily up to `ideal`, then reused least-loaded first.
pub fn choose_worker(loads: &[usize], ideal: usize) -> Placement {
    if loads.len() < ideal.max(1) {
        return Placement::Spawn;
    }
    least_loaded(loads).map_or(Placement::Spawn, Placement::Reuse)
}

struct WorkerSlot {
    worker: Worker,
    load: usize,
}

#[derive(Default)]
struct DispatcherState {
    /// SessionId 順 = 接続順
    sessions: BTreeMap<SessionId, Arc<SessionHandle>>,
    workers: Vec<WorkerSlot>,
    stopping: bool,
}

impl DispatcherState {
    /// 終了したワーカーを同じ番号で作り直す
    ///
    /// 旧ワーカー上のセッションはタスクごと失われているため、集合からも取り除く。
    fn restart_worker(&mut self, index: usize) -> io::Result<()> {
        let worker = Worker::spawn(index)?;
        let before = self.sessions.len();
        self.sessions.retain(|_, handle| handle.worker() != index);
        if let Some(slot) = self.workers.get_mut(index) {
            *slot = WorkerSlot { worker, load: 0 };
        }
        tracing::warn!(
            "Restarted worker {} ({} session(s) lost with it)",
            index,
            before - self.sessions.len()
        );
        Ok(())
    }
}

/// Connection Dispatcher
pub struct Dispatcher {
    ideal_workers: usize,
    next_session: AtomicU64,
    state: Mutex<DispatcherState>,
}

impl Dispatcher {
    pub fn new(ideal_workers: usize) -> Self {
        Self {
            ideal_workers: ideal_workers.max(1),
            next_session: AtomicU64::new(1),
            state: Mutex::new(DispatcherState::default()),
        }
    }

    pub fn ideal_workers(&self) -> usize {
        self.ideal_workers
    }

    /// 受け付けたソケットからセッションを作り、ワーカーに割り当てる
    ///
    /// 停止中、またはワーカーに渡せなかった場合は `None`（ソケットは閉じられる）。
    pub fn attach(
        &self,
        socket: std::net::TcpStream,
        peer: SocketAddr,
        handler: Arc<PacketHandler>,
        max_frame_len: usize,
    ) -> Option<SessionId> {
        let mut state = self.state.lock();
        if state.stopping {
            tracing::debug!("Refusing {} while stopping", peer);
            return None;
        }

        let loads: Vec<usize> = state.workers.iter().map(|slot| slot.load).collect();
        let index = match choose_worker(&loads, self.ideal_workers) {
            Placement::Reuse(index) => index,
            Placement::Spawn => {
                let index = state.workers.len();
                match Worker::spawn(index) {
                    Ok(worker) => {
                        state.workers.push(WorkerSlot { worker, load: 0 });
                        index
                    }
                    Err(e) => {
                        tracing::error!("Failed to start worker {}: {}", index, e);
                        least_loaded(&loads)?
                    }
                }
            }
        };

        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed));
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let handle = Arc::new(SessionHandle::new(id, peer, index, inbox_tx));
        let task = SessionTask::new(
            Arc::clone(&handle),
            socket,
            inbox_rx,
            handler,
            max_frame_len,
        );

        if let Err(task) = state.workers.get(index)?.worker.attach(task) {
            tracing::warn!("Worker {} is gone, restarting it", index);
            if let Err(e) = state.restart_worker(index) {
                tracing::error!("Failed to restart worker {}, discarding {}: {}", index, peer, e);
                return None;
            }
            if state.workers.get(index)?.worker.attach(task).is_err() {
                tracing::warn!("Restarted worker {} is gone, discarding {}", index, peer);
                return None;
            }
        }
        let slot = state.workers.get_mut(index)?;
        slot.load += 1;
        let load = slot.load;
        state.sessions.insert(id, handle);

        tracing::info!(
            "Accepted {} as session {} on worker {} (load {})",
            peer,
            id,
            index,
            load
        );
        Some(id)
    }

    /// アクティブな集合から取り除き、所有ワーカーの負荷を減らす
    pub fn remove(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        let mut state = self.state.lock();
        let handle = state.sessions.remove(&id)?;
        if let Some(slot) = state.workers.get_mut(handle.worker()) {
            slot.load = slot.load.saturating_sub(1);
        }
        Some(handle)
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.state.lock().sessions.get(&id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// ワーカーごとの現在の負荷（ワーカー番号順）
    pub fn worker_loads(&self) -> Vec<usize> {
        self.state
            .lock()
            .workers
            .iter()
            .map(|slot| slot.load)
            .collect()
    }

    /// 全セッションに切断を要求し、以後の割り当てを拒否する
    pub fn stop_all(&self) {
        let mut state = self.state.lock();
        state.stopping = true;
        for handle in state.sessions.values() {
            handle.disconnect();
        }
        tracing::info!("Asked {} session(s) to disconnect", state.sessions.len());
    }

    /// 全ワーカーに終了を指示し、終了を待つ（ブロッキング）
    pub fn join_workers(&self) {
        let workers = std::mem::take(&mut self.state.lock().workers);
        for slot in workers {
            slot.worker.quit_and_join();
        }
    }

    /// 終了済みのワーカーを追加する
    #[cfg(test)]
    pub(crate) fn push_stopped_worker(&self) {
        let mut state = self.state.lock();
        let index = state.workers.len();
        state.workers.push(WorkerSlot {
            worker: Worker::stopped(index),
            load: 0,
        });
    }

    /// ワーカーに属さないセッションを登録する（ハンドラ単体テスト用）
    #[cfg(test)]
    pub(crate) fn register_detached(
        &self,
    ) -> (
        Arc<SessionHandle>,
        mpsc::UnboundedReceiver<super::session::SessionCommand>,
    ) {
        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = SocketAddr::from(([127, 0, 0, 1], 40000 + id.value() as u16));
        let handle = Arc::new(SessionHandle::new(id, peer, usize::MAX, tx));
        self.state.lock().sessions.insert(id, Arc::clone(&handle));
        (handle, rx)
    }
}

impl Presence for Dispatcher {
    fn claim_username(&self, session: SessionId, username: &Username) -> Result<(), BindError> {
        let state = self.state.lock();
        if state
            .sessions
            .values()
            .any(|handle| handle.username().as_ref() == Some(username))
        {
            return Err(BindError::UsernameTaken);
        }
        state
            .sessions
            .get(&session)
            .ok_or(BindError::UnknownSession)?
            .set_username(username.clone())
    }

    fn join_group(
        &self,
        session: SessionId,
        group: &GroupName,
    ) -> Result<Vec<GroupMember>, BindError> {
        let state = self.state.lock();
        state
            .sessions
            .get(&session)
            .ok_or(BindError::UnknownSession)?
            .set_group(group.clone())?;

        Ok(state
            .sessions
            .iter()
            .filter(|(id, _)| **id != session)
            .filter_map(|(id, handle)| match handle.state() {
                SessionState::InGroup {
                    username,
                    group: joined,
                } if &joined == group => Some(GroupMember {
                    session: *id,
                    username,
                }),
                _ => None,
            })
            .collect())
    }
}

impl MessagePusher for Dispatcher {
    fn unicast(&self, target: SessionId, packet: Packet) {
        let Some(handle) = self.session(target) else {
            tracing::debug!("Dropping packet for departed session {}", target);
            return;
        };
        handle.send(packet);
    }

    fn broadcast(&self, group: &GroupName, packet: Packet, exclude: Option<SessionId>) {
        let targets: Vec<Arc<SessionHandle>> = {
            let state = self.state.lock();
            state
                .sessions
                .iter()
                .filter(|(id, handle)| Some(**id) != exclude && handle.is_member_of(group))
                .map(|(_, handle)| Arc::clone(handle))
                .collect()
        };
        for handle in targets {
            handle.send(packet.clone());
        }
    }
}
