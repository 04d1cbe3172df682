use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::error::PlaybackError;
use crate::model::Track;

/// Tope del historial de reproducción por destino.
const HISTORY_LIMIT: usize = 50;

/// Cola FIFO de reproducción, una por destino.
///
/// Todas las operaciones pasan por el mismo lock, lecturas incluidas:
/// ningún caller toca los internals directamente. `pop` sobre cola vacía
/// devuelve `None` sin bloquear; decidir si esperar es cosa del loop del
/// player. El historial guarda los tracks ya reproducidos, acotado a
/// [`HISTORY_LIMIT`], para poder volver atrás.
#[derive(Debug)]
pub struct PlaybackQueue {
    items: Mutex<VecDeque<Track>>,
    history: Mutex<VecDeque<Track>>,
    max_size: usize,
}

impl PlaybackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            history: Mutex::new(VecDeque::new()),
            max_size,
        }
    }

    /// Agrega un track al final, o en `position` si se indica.
    pub fn enqueue(&self, track: Track, position: Option<usize>) -> Result<(), PlaybackError> {
        let mut items = self.items.lock();
        if items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size));
        }

        match position {
            Some(position) if position < items.len() => {
                items.insert(position, track);
                debug!("📍 Track insertado en posición {}", position);
            }
            _ => {
                info!("➕ Agregado a la cola: {}", track.title);
                items.push_back(track);
            }
        }
        Ok(())
    }

    /// Saca el siguiente track en orden FIFO estricto.
    pub fn pop(&self) -> Option<Track> {
        self.items.lock().pop_front()
    }

    /// Mira el siguiente track sin sacarlo.
    pub fn peek(&self) -> Option<Track> {
        self.items.lock().front().cloned()
    }

    /// Elimina la primera aparición de un track por su id.
    pub fn remove(&self, track_id: &str) -> bool {
        let mut items = self.items.lock();
        if let Some(index) = items.iter().position(|track| track.id() == track_id) {
            items.remove(index);
            debug!("❌ Track eliminado de la cola en posición {}", index);
            true
        } else {
            false
        }
    }

    /// Descarta hasta `n` tracks del frente; devuelve cuántos cayeron.
    pub fn drop_front(&self, n: usize) -> usize {
        let mut items = self.items.lock();
        let dropped = n.min(items.len());
        items.drain(..dropped);
        dropped
    }

    /// Descarta la cola pendiente y el historial.
    pub fn clear(&self) {
        self.items.lock().clear();
        self.history.lock().clear();
        info!("🗑️ Cola limpiada");
    }

    /// Registra un track reproducido, descartando el más viejo si el
    /// historial llegó al tope.
    pub fn record_played(&self, track: Track) {
        let mut history = self.history.lock();
        history.push_back(track);
        if history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
    }

    /// Saca el track reproducido más reciente del historial.
    pub fn pop_history(&self) -> Option<Track> {
        self.history.lock().pop_back()
    }

    pub fn can_back(&self) -> bool {
        !self.history.lock().is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Mezcla la cola
    pub fn shuffle(&self) {
        let mut items = self.items.lock();
        let mut shuffled: Vec<Track> = items.drain(..).collect();
        shuffled.shuffle(&mut rand::thread_rng());
        items.extend(shuffled);
        info!("🔀 Cola mezclada");
    }

    /// Copia de los primeros `limit` tracks, para previews de la UI.
    pub fn snapshot(&self, limit: usize) -> Vec<Track> {
        self.items.lock().iter().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MusicProvider;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn track(n: u8) -> Track {
        Track {
            title: format!("Track {n}"),
            artist: "Artist".to_string(),
            album: None,
            duration_secs: 120.0,
            filename: format!("{n:02x}.mp3"),
            sha256: format!("{n:064x}"),
            provider: MusicProvider::Spotify,
            imported_at: Utc::now(),
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = PlaybackQueue::new(10);
        for n in 1..=5 {
            queue.enqueue(track(n), None).unwrap();
        }

        let popped: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|t| t.title)
            .collect();
        assert_eq!(
            popped,
            vec!["Track 1", "Track 2", "Track 3", "Track 4", "Track 5"]
        );
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_positional_enqueue() {
        let queue = PlaybackQueue::new(10);
        queue.enqueue(track(1), None).unwrap();
        queue.enqueue(track(2), None).unwrap();
        queue.enqueue(track(3), Some(1)).unwrap();

        assert_eq!(queue.pop().unwrap().title, "Track 1");
        assert_eq!(queue.pop().unwrap().title, "Track 3");
        assert_eq!(queue.pop().unwrap().title, "Track 2");
    }

    #[test]
    fn test_peek_does_not_consume() {
        let queue = PlaybackQueue::new(10);
        queue.enqueue(track(1), None).unwrap();

        assert_eq!(queue.peek().unwrap().title, "Track 1");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().title, "Track 1");
        assert!(queue.peek().is_none());
    }

    #[test]
    fn test_remove_by_id() {
        let queue = PlaybackQueue::new(10);
        queue.enqueue(track(1), None).unwrap();
        queue.enqueue(track(2), None).unwrap();

        assert!(queue.remove(&track(1).sha256));
        assert!(!queue.remove(&track(9).sha256));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().title, "Track 2");
    }

    #[test]
    fn test_full_queue_rejects_enqueue() {
        let queue = PlaybackQueue::new(2);
        queue.enqueue(track(1), None).unwrap();
        queue.enqueue(track(2), None).unwrap();

        assert!(matches!(
            queue.enqueue(track(3), None),
            Err(PlaybackError::QueueFull(2))
        ));
    }

    #[test]
    fn test_shuffle_keeps_contents() {
        let queue = PlaybackQueue::new(100);
        for n in 0..50 {
            queue.enqueue(track(n), None).unwrap();
        }
        queue.shuffle();

        let mut ids: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|t| t.sha256)
            .collect();
        ids.sort();
        let mut expected: Vec<String> = (0..50).map(|n| track(n).sha256).collect();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_drop_front() {
        let queue = PlaybackQueue::new(10);
        for n in 1..=4 {
            queue.enqueue(track(n), None).unwrap();
        }

        assert_eq!(queue.drop_front(2), 2);
        assert_eq!(queue.pop().unwrap().title, "Track 3");
        assert_eq!(queue.drop_front(5), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_history_pops_most_recent_first() {
        let queue = PlaybackQueue::new(10);
        queue.record_played(track(1));
        queue.record_played(track(2));

        assert!(queue.can_back());
        assert_eq!(queue.pop_history().unwrap().title, "Track 2");
        assert_eq!(queue.pop_history().unwrap().title, "Track 1");
        assert!(!queue.can_back());
        assert!(queue.pop_history().is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let queue = PlaybackQueue::new(10);
        for n in 0..60 {
            queue.record_played(track(n));
        }

        assert_eq!(queue.history_len(), 50);
        // Se descartan los más viejos, no los recientes.
        assert_eq!(queue.pop_history().unwrap().title, "Track 59");
    }

    #[test]
    fn test_clear_wipes_history_too() {
        let queue = PlaybackQueue::new(10);
        queue.enqueue(track(1), None).unwrap();
        queue.record_played(track(2));

        queue.clear();
        assert!(queue.is_empty());
        assert!(!queue.can_back());
    }

    #[test]
    fn test_snapshot_limit() {
        let queue = PlaybackQueue::new(10);
        for n in 1..=5 {
            queue.enqueue(track(n), None).unwrap();
        }

        let preview = queue.snapshot(3);
        assert_eq!(preview.len(), 3);
        assert_eq!(preview[0].title, "Track 1");
        assert_eq!(queue.len(), 5);
    }
}
