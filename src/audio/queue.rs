use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::{collections::VecDeque, time::Duration};
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, info};

use crate::audio::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    None,
    Single,
    Queue,
}

impl LoopMode {
    /// Ciclo None → Single → Queue → None
    pub fn next(self) -> Self {
        match self {
            LoopMode::None => LoopMode::Single,
            LoopMode::Single => LoopMode::Queue,
            LoopMode::Queue => LoopMode::None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LoopMode::None => "off",
            LoopMode::Single => "single",
            LoopMode::Queue => "queue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("La cola está llena (máximo {capacity} canciones)")]
    Full { capacity: usize },
    #[error("Posición inválida: {position} (la cola tiene {len} canciones)")]
    InvalidPosition { position: usize, len: usize },
}

/// Cola FIFO acotada de un servidor.
///
/// Es la única estructura con varios escritores concurrentes (comandos que
/// encolan a la vez), así que toda mutación pasa por un único mutex. El
/// consumidor espera con [`PlaybackQueue::dequeue_until`] en lugar de sondear.
#[derive(Debug)]
pub struct PlaybackQueue {
    items: Mutex<VecDeque<Track>>,
    available: Notify,
    capacity: usize,
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            capacity,
        }
    }

    /// Agrega una pista al final; devuelve su posición (base 1)
    pub fn enqueue(&self, track: Track) -> Result<usize, QueueError> {
        let position = {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }
            info!("➕ Agregado a la cola: {}", track.title());
            items.push_back(track);
            items.len()
        };
        self.available.notify_one();
        Ok(position)
    }

    /// Agrega varias pistas bajo un solo bloqueo; para en cuanto se llena.
    ///
    /// Devuelve cuántas entraron.
    pub fn enqueue_batch(&self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let added = {
            let mut items = self.items.lock();
            let mut added = 0;
            for track in tracks {
                if items.len() >= self.capacity {
                    break;
                }
                items.push_back(track);
                added += 1;
            }
            added
        };

        if added > 0 {
            info!("➕ Agregadas {} canciones a la cola", added);
            self.available.notify_one();
        }
        added
    }

    /// Devuelve al final una pista que acaba de sonar (loop de cola)
    pub fn requeue(&self, track: Track) -> Result<(), QueueError> {
        debug!("🔁 Reencolando: {}", track.title());
        self.enqueue(track).map(|_| ())
    }

    pub fn try_dequeue(&self) -> Option<Track> {
        self.items.lock().pop_front()
    }

    /// Espera la siguiente pista hasta `deadline`.
    ///
    /// Es seguro cancelarla: una pista solo sale de la cola dentro de
    /// `try_dequeue`, nunca mientras se espera.
    pub async fn dequeue_until(&self, deadline: Instant) -> Option<Track> {
        loop {
            let notified = self.available.notified();
            if let Some(track) = self.try_dequeue() {
                return Some(track);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_dequeue();
            }
        }
    }

    /// Quita la pista en `position` (base 1)
    pub fn remove(&self, position: usize) -> Result<Track, QueueError> {
        let mut items = self.items.lock();
        let len = items.len();
        if position == 0 || position > len {
            return Err(QueueError::InvalidPosition { position, len });
        }
        let track = items
            .remove(position - 1)
            .ok_or(QueueError::InvalidPosition { position, len })?;
        debug!("❌ Eliminada la posición {}: {}", position, track.title());
        Ok(track)
    }

    /// Mezcla el orden pendiente; no hace nada con 0 o 1 elementos
    pub fn shuffle(&self) {
        let mut items = self.items.lock();
        if items.len() <= 1 {
            return;
        }
        let mut rng = rand::thread_rng();
        items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada");
    }

    /// Copia ordenada para mostrar; no modifica la cola
    pub fn peek_all(&self) -> Vec<Track> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let cleared = items.len();
        items.clear();
        if cleared > 0 {
            info!("🗑️ Cola limpiada: {} pistas", cleared);
        }
        cleared
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_duration(&self) -> Duration {
        self.items.lock().iter().filter_map(|track| track.duration()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn track(name: &str) -> Track {
        Track::new(name, format!("https://cdn/{}", name), format!("https://page/{}", name)).with_duration(60)
    }

    fn titles(queue: &PlaybackQueue) -> Vec<String> {
        queue.peek_all().iter().map(|t| t.title().to_string()).collect()
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let queue = PlaybackQueue::new(3);
        for name in ["A", "B", "C"] {
            queue.enqueue(track(name)).unwrap();
        }

        let err = queue.enqueue(track("D")).unwrap_err();

        assert_eq!(err, QueueError::Full { capacity: 3 });
        assert_eq!(titles(&queue), vec!["A", "B", "C"]);
        assert_eq!(queue.len(), queue.capacity());
    }

    #[test]
    fn test_enqueue_returns_position() {
        let queue = PlaybackQueue::new(5);
        assert_eq!(queue.enqueue(track("A")).unwrap(), 1);
        assert_eq!(queue.enqueue(track("B")).unwrap(), 2);
    }

    #[test]
    fn test_batch_stops_at_capacity() {
        let queue = PlaybackQueue::new(2);
        let added = queue.enqueue_batch(vec![track("A"), track("B"), track("C")]);
        assert_eq!(added, 2);
        assert_eq!(titles(&queue), vec!["A", "B"]);
    }

    #[test]
    fn test_remove_by_position() {
        let queue = PlaybackQueue::new(10);
        queue.enqueue_batch(vec![track("A"), track("B"), track("C")]);

        let removed = queue.remove(1).unwrap();

        assert_eq!(removed.title(), "A");
        assert_eq!(titles(&queue), vec!["B", "C"]);
    }

    #[test]
    fn test_remove_out_of_range_leaves_queue_untouched() {
        let queue = PlaybackQueue::new(10);
        queue.enqueue_batch(vec![track("A"), track("B"), track("C")]);

        assert_eq!(
            queue.remove(4).unwrap_err(),
            QueueError::InvalidPosition { position: 4, len: 3 }
        );
        assert!(queue.remove(0).is_err());
        assert_eq!(titles(&queue), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_shuffle_keeps_elements() {
        let queue = PlaybackQueue::new(50);
        let names: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        queue.enqueue_batch(names.iter().map(|n| track(n)));

        queue.shuffle();

        let mut after = titles(&queue);
        after.sort();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(after, expected);
    }

    #[test]
    fn test_shuffle_single_element_is_noop() {
        let queue = PlaybackQueue::new(5);
        queue.shuffle();
        queue.enqueue(track("A")).unwrap();
        queue.shuffle();
        assert_eq!(titles(&queue), vec!["A"]);
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let queue = PlaybackQueue::new(5);
        queue.enqueue(track("A")).unwrap();
        let _ = queue.peek_all();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.total_duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_requeue_respects_capacity() {
        let queue = PlaybackQueue::new(1);
        queue.enqueue(track("A")).unwrap();
        assert!(queue.requeue(track("B")).is_err());
        assert_eq!(titles(&queue), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dequeue_times_out_on_empty_queue() {
        let queue = PlaybackQueue::new(5);
        let start = Instant::now();
        assert!(queue.dequeue_until(start + Duration::from_secs(300)).await.is_none());
        assert!(start.elapsed() >= Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(PlaybackQueue::new(5));
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            producer.enqueue(track("A")).unwrap();
        });

        let next = queue.dequeue_until(Instant::now() + Duration::from_secs(10)).await;
        assert_eq!(next.map(|t| t.title().to_string()), Some("A".to_string()));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_order() {
        let queue = PlaybackQueue::new(5);
        queue.enqueue_batch(vec![track("A"), track("B")]);
        let first = queue.try_dequeue().unwrap();
        let second = queue.try_dequeue().unwrap();
        assert_eq!((first.title(), second.title()), ("A", "B"));
    }

    #[test]
    fn test_loop_mode_cycle() {
        assert_eq!(LoopMode::None.next(), LoopMode::Single);
        assert_eq!(LoopMode::Single.next(), LoopMode::Queue);
        assert_eq!(LoopMode::Queue.next(), LoopMode::None);
    }
}
