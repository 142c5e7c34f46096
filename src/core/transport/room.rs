//! LiveKit room transport.
//!
//! The agent joins the room as its own participant, subscribes to every remote
//! audio track and publishes a single microphone track carrying model speech.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use livekit::options::TrackPublishOptions;
use livekit::prelude::{
    LocalAudioTrack, LocalTrack, RemoteTrack, Room, RoomError, RoomEvent, RoomOptions, TrackSource,
};
use livekit::webrtc::audio_frame::AudioFrame as RtcAudioFrame;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::base::{
    AudioFrameStream, OutboundStats, RoomCredential, TransportBridge, TransportConnector,
    TransportError, TransportResult,
};
use super::outbound::{DEFAULT_OUTBOUND_CAPACITY, OutboundAudioQueue};
use crate::core::codec::{AudioFrame, FrameSource, PcmFormat};

/// Name of the track the agent publishes.
pub const AGENT_TRACK_NAME: &str = "agent_audio";

/// Milliseconds of audio the native source buffers ahead of the network.
const NATIVE_SOURCE_QUEUE_MS: u32 = 200;

/// Settings shared by every bridge a [`LiveKitTransport`] creates.
#[derive(Debug, Clone)]
pub struct LiveKitTransportConfig {
    /// Room server WebSocket URL
    pub url: String,
    /// Format used both for subscribing and publishing
    pub format: PcmFormat,
    /// Outbound queue capacity in frames
    pub outbound_capacity: usize,
    pub track_name: String,
}

impl LiveKitTransportConfig {
    pub fn new(url: impl Into<String>, format: PcmFormat) -> Self {
        Self {
            url: url.into(),
            format,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            track_name: AGENT_TRACK_NAME.to_string(),
        }
    }
}

/// Connector that joins LiveKit rooms.
#[derive(Debug, Clone)]
pub struct LiveKitTransport {
    config: LiveKitTransportConfig,
}

impl LiveKitTransport {
    pub fn new(config: LiveKitTransportConfig) -> Self {
        Self { config }
    }
}

fn classify_connect_error(err: RoomError) -> TransportError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("permission")
        || lower.contains("token")
    {
        TransportError::CredentialRejected(message)
    } else {
        TransportError::ConnectionFailed(message)
    }
}

#[async_trait]
impl TransportConnector for LiveKitTransport {
    async fn connect(&self, credential: RoomCredential) -> TransportResult<Box<dyn TransportBridge>> {
        let format = self.config.format;

        let (room, events) =
            Room::connect(&self.config.url, credential.as_str(), RoomOptions::default())
                .await
                .map_err(classify_connect_error)?;
        let room = Arc::new(room);

        info!(
            room = %room.name(),
            url = %self.config.url,
            "Joined LiveKit room"
        );

        let source = NativeAudioSource::new(
            AudioSourceOptions::default(),
            format.sample_rate,
            format.channels as u32,
            NATIVE_SOURCE_QUEUE_MS,
        );
        let track = LocalAudioTrack::create_audio_track(
            &self.config.track_name,
            RtcAudioSource::Native(source.clone()),
        );

        let publish = room
            .local_participant()
            .publish_track(
                LocalTrack::Audio(track),
                TrackPublishOptions {
                    source: TrackSource::Microphone,
                    ..Default::default()
                },
            )
            .await;
        if let Err(e) = publish {
            if let Err(close_err) = room.close().await {
                warn!("Failed to leave room after publish error: {}", close_err);
            }
            return Err(TransportError::PublishFailed(e.to_string()));
        }

        let outbound = Arc::new(OutboundAudioQueue::new(self.config.outbound_capacity));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let event_task = tokio::spawn(run_room_events(events, inbound_tx, format));
        let publisher_task = tokio::spawn(run_publisher(source, outbound.clone()));

        Ok(Box::new(LiveKitBridge {
            room,
            format,
            inbound: Mutex::new(Some(inbound_rx)),
            outbound,
            tasks: Mutex::new(vec![event_task, publisher_task]),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Forward room events until the room disconnects.
///
/// Every subscribed remote audio track gets its own reader task. All readers
/// share one receipt-order counter so sequence numbers stay strictly
/// increasing across participants. Readers are aborted when this task ends or
/// is aborted, since the join set is dropped with it.
async fn run_room_events(
    mut events: mpsc::UnboundedReceiver<RoomEvent>,
    inbound_tx: mpsc::UnboundedSender<AudioFrame>,
    format: PcmFormat,
) {
    let counter = Arc::new(AtomicU64::new(0));
    let mut readers = JoinSet::new();

    while let Some(event) = events.recv().await {
        match event {
            RoomEvent::TrackSubscribed {
                track: RemoteTrack::Audio(audio_track),
                participant,
                ..
            } => {
                info!(
                    participant = ?participant.identity(),
                    "Subscribed to participant audio"
                );
                let mut stream = NativeAudioStream::new(
                    audio_track.rtc_track(),
                    format.sample_rate as i32,
                    format.channels as i32,
                );
                let tx = inbound_tx.clone();
                let counter = counter.clone();
                readers.spawn(async move {
                    while let Some(frame) = stream.next().await {
                        let sequence = counter.fetch_add(1, Ordering::Relaxed);
                        let frame = AudioFrame::from_samples(
                            &frame.data,
                            frame.sample_rate,
                            frame.num_channels as u16,
                            sequence,
                            FrameSource::Client,
                        );
                        if tx.send(frame).is_err() {
                            break;
                        }
                    }
                });
            }
            RoomEvent::TrackUnsubscribed { participant, .. } => {
                debug!(participant = ?participant.identity(), "Track unsubscribed");
            }
            RoomEvent::Disconnected { reason } => {
                info!("LiveKit room disconnected: {:?}", reason);
                break;
            }
            _ => {}
        }
    }

    readers.abort_all();
}

/// Drain the outbound queue into the native audio source.
async fn run_publisher(source: NativeAudioSource, outbound: Arc<OutboundAudioQueue>) {
    while let Some(frame) = outbound.pop().await {
        let samples = frame.to_samples();
        let rtc_frame = RtcAudioFrame {
            samples_per_channel: frame.samples_per_channel() as u32,
            sample_rate: frame.sample_rate(),
            num_channels: frame.channels() as u32,
            data: Cow::Owned(samples),
        };

        if let Err(e) = source.capture_frame(&rtc_frame).await {
            warn!("Failed to publish audio frame: {}", e);
            outbound.fail(TransportError::PublishFailed(e.to_string()));
            break;
        }
    }
}

/// One joined LiveKit room.
pub struct LiveKitBridge {
    room: Arc<Room>,
    format: PcmFormat,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<AudioFrame>>>,
    outbound: Arc<OutboundAudioQueue>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

#[async_trait]
impl TransportBridge for LiveKitBridge {
    fn subscribe_inbound_audio(&self) -> TransportResult<AudioFrameStream> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let mut rx = self
            .inbound
            .lock()
            .take()
            .ok_or(TransportError::AlreadySubscribed)?;

        Ok(Box::pin(async_stream::stream! {
            while let Some(frame) = rx.recv().await {
                yield frame;
            }
        }))
    }

    fn publish_outbound_audio(&self, frame: AudioFrame) -> TransportResult<()> {
        self.outbound.push(frame)
    }

    fn publish_format(&self) -> PcmFormat {
        self.format
    }

    fn outbound_stats(&self) -> OutboundStats {
        self.outbound.stats()
    }

    async fn close(&self) -> TransportResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.outbound.close();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let stats = self.outbound.stats();
        if let Err(e) = self.room.close().await {
            warn!("Error while leaving LiveKit room: {}", e);
        }
        info!(
            room = %self.room.name(),
            sent = stats.sent,
            dropped = stats.dropped,
            "Left LiveKit room"
        );
        Ok(())
    }
}
