//! Priority-Queue fuer Nachrichten waehrend der Trennung
//!
//! Strikte Prioritaet (High vor Normal vor Low), FIFO innerhalb einer
//! Stufe. Bei voller Queue wird die aelteste Nachricht der niedrigsten
//! belegten Stufe verdraengt, sofern diese nicht hoeher ist als die neue.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Instant;
use voxlane_core::types::MessageId;

/// Prioritaet einer Nachricht (kleiner = wichtiger)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// Rang fuer die Sortierung (0 = hoechste Prioritaet)
    pub fn rang(self) -> usize {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

/// Eine wartende Nachricht
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub id: MessageId,
    pub payload: Value,
    pub enqueued_at: Instant,
    pub priority: Priority,
    pub retries: u32,
}

impl QueuedMessage {
    pub fn neu(id: MessageId, payload: Value, priority: Priority) -> Self {
        Self {
            id,
            payload,
            enqueued_at: Instant::now(),
            priority,
            retries: 0,
        }
    }
}

/// Drei FIFO-Stufen mit gemeinsamer Kapazitaet
#[derive(Debug)]
pub struct PriorityQueue {
    stufen: [VecDeque<QueuedMessage>; 3],
    kapazitaet: usize,
}

impl PriorityQueue {
    pub fn new(kapazitaet: usize) -> Self {
        Self {
            stufen: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            kapazitaet: kapazitaet.max(1),
        }
    }

    /// Fuegt eine Nachricht hinzu
    ///
    /// Gibt die verdraengte Nachricht zurueck, falls die Queue voll war.
    /// Das kann auch die neue Nachricht selbst sein.
    pub fn push(&mut self, nachricht: QueuedMessage) -> Option<QueuedMessage> {
        let mut verdraengt = None;
        if self.len() >= self.kapazitaet {
            let rang = nachricht.priority.rang();
            match (rang..3).rev().find(|&r| !self.stufen[r].is_empty()) {
                Some(r) => verdraengt = self.stufen[r].pop_front(),
                None => return Some(nachricht),
            }
        }
        self.stufen[nachricht.priority.rang()].push_back(nachricht);
        verdraengt
    }

    /// Entnimmt die naechste Nachricht in Prioritaetsreihenfolge
    pub fn pop(&mut self) -> Option<QueuedMessage> {
        self.stufen.iter_mut().find_map(|s| s.pop_front())
    }

    /// Entnimmt alle Nachrichten in Prioritaetsreihenfolge
    pub fn alle_entnehmen(&mut self) -> Vec<QueuedMessage> {
        let mut alle = Vec::with_capacity(self.len());
        while let Some(n) = self.pop() {
            alle.push(n);
        }
        alle
    }

    /// Stellt entnommene Nachrichten wieder an den Anfang ihrer Stufe
    ///
    /// `nachrichten` muss in Entnahmereihenfolge vorliegen. Die Kapazitaet
    /// wird nicht geprueft, da die Nachrichten vorher in der Queue lagen.
    pub fn zurueckstellen(&mut self, nachrichten: Vec<QueuedMessage>) {
        for n in nachrichten.into_iter().rev() {
            self.stufen[n.priority.rang()].push_front(n);
        }
    }

    pub fn len(&self) -> usize {
        self.stufen.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stufen.iter().all(|s| s.is_empty())
    }

    /// Anzahl Nachrichten einer Stufe
    pub fn len_stufe(&self, priority: Priority) -> usize {
        self.stufen[priority.rang()].len()
    }

    pub fn clear(&mut self) {
        for s in self.stufen.iter_mut() {
            s.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(nr: u32, p: Priority) -> QueuedMessage {
        QueuedMessage::neu(MessageId::new(), json!({ "nr": nr }), p)
    }

    #[test]
    fn prioritaet_vor_fifo() {
        let mut q = PriorityQueue::new(100);
        q.push(msg(1, Priority::Low));
        q.push(msg(2, Priority::Normal));
        q.push(msg(3, Priority::High));
        q.push(msg(4, Priority::Normal));
        q.push(msg(5, Priority::High));

        let reihenfolge: Vec<u64> = q
            .alle_entnehmen()
            .iter()
            .map(|m| m.payload["nr"].as_u64().unwrap_or_default())
            .collect();
        assert_eq!(reihenfolge, vec![3, 5, 2, 4, 1]);
        assert!(q.is_empty());
    }

    #[test]
    fn rang_nie_fallend() {
        let mut q = PriorityQueue::new(1000);
        let prios = [Priority::Low, Priority::High, Priority::Normal];
        for i in 0..300u32 {
            q.push(msg(i, prios[(i as usize * 7) % 3]));
        }
        let alle = q.alle_entnehmen();
        assert!(alle.windows(2).all(|w| w[0].priority <= w[1].priority));
        for w in alle.windows(2) {
            if w[0].priority == w[1].priority {
                assert!(w[0].payload["nr"].as_u64() < w[1].payload["nr"].as_u64());
            }
        }
    }

    #[test]
    fn volle_queue_verdraengt_niedrigste() {
        let mut q = PriorityQueue::new(2);
        q.push(msg(1, Priority::Low));
        q.push(msg(2, Priority::High));
        let raus = q.push(msg(3, Priority::Normal)).unwrap();
        assert_eq!(raus.payload["nr"], 1);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn zurueckgestellte_nachrichten_behalten_reihenfolge() {
        let mut q = PriorityQueue::new(10);
        for (nr, p) in [(1, Priority::High), (2, Priority::Normal), (3, Priority::Normal), (4, Priority::Low)] {
            q.push(msg(nr, p));
        }
        let mut alle = q.alle_entnehmen();
        let rest = alle.split_off(1);
        // Waehrend des Flushs neu eingereiht
        q.push(msg(5, Priority::Normal));
        q.zurueckstellen(rest);

        let reihenfolge: Vec<u64> = q
            .alle_entnehmen()
            .iter()
            .map(|m| m.payload["nr"].as_u64().unwrap_or_default())
            .collect();
        assert_eq!(reihenfolge, vec![2, 3, 5, 4]);
    }

    #[test]
    fn volle_queue_lehnt_niedrigere_ab() {
        let mut q = PriorityQueue::new(1);
        q.push(msg(1, Priority::High));
        let raus = q.push(msg(2, Priority::Low)).unwrap();
        assert_eq!(raus.payload["nr"], 2);
        assert_eq!(q.len_stufe(Priority::High), 1);
    }
}
