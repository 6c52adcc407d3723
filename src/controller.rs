use std::sync::atomic::{AtomicU64, Ordering};

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tracing::{debug, error, info, warn};

use crate::error::{Action, PlaybackError};
use crate::messages::Messages;
use crate::models::{Connection, ControlRequest, PlayRequest, Queue, Song, TrackToken};
use crate::resolver::{looks_like_url, Resolver};
use crate::store::{GuildSlot, QueueStore};

/// What the controller needs from the chat platform's voice and text side.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError>;

    /// Starts streaming `song`, replacing whatever was playing. The backend must
    /// report the end of this track through
    /// [`PlaybackController::track_finished`] with the same `token`.
    async fn play(&self, guild_id: GuildId, song: &Song, volume: f32, token: TrackToken) -> Result<(), PlaybackError>;

    async fn stop(&self, guild_id: GuildId);

    async fn leave(&self, guild_id: GuildId);

    /// Whether a voice session for the guild is currently established.
    async fn is_connected(&self, guild_id: GuildId) -> bool;

    async fn say(&self, channel_id: ChannelId, text: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// A new queue was created and its first song started.
    Started,
    /// Appended behind the current song; `position` is 1-based.
    Queued { position: usize },
    /// A new queue was created but none of its songs could be started, so it
    /// was torn down again.
    Unplayable,
}

pub struct PlaybackController<R, V> {
    store: QueueStore,
    resolver: R,
    voice: V,
    messages: Messages,
    default_volume: f32,
    next_token: AtomicU64,
}

impl<R: Resolver, V: VoiceBackend> PlaybackController<R, V> {
    pub fn new(resolver: R, voice: V, messages: Messages, default_volume: f32) -> Self {
        Self {
            store: QueueStore::new(),
            resolver,
            voice,
            messages,
            default_volume,
            next_token: AtomicU64::new(1),
        }
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    /// Songs waiting in the guild's queue, current one first.
    pub async fn songs(&self, guild_id: GuildId) -> Vec<Song> {
        self.store
            .get(guild_id)
            .await
            .map(|queue| queue.songs.into())
            .unwrap_or_default()
    }

    pub async fn enqueue(&self, request: PlayRequest) -> Result<Enqueued, PlaybackError> {
        let voice_channel = request.voice_channel.ok_or(PlaybackError::NotInVoiceChannel(Action::Play))?;

        if !request.can_connect_and_speak {
            return Err(PlaybackError::InsufficientPermissions);
        }

        let query = request.query.trim();

        if query.is_empty() {
            return Err(PlaybackError::MissingQuery);
        }

        // Resolution runs without the guild lock so a slow lookup does not
        // hold up skip and stop.
        let url = if looks_like_url(query) {
            query.to_string()
        } else {
            self.resolver.search(query).await?
        };

        let song = self.resolver.metadata(&url).await?;

        let mut slot = self.store.lock(request.guild_id).await;

        if let Some(queue) = slot.get_mut() {
            queue.songs.push_back(song.clone());
            let position = queue.songs.len();

            info!("ENQUEUE - {} added at position {position}", song.title);
            self.voice.say(request.text_channel, &self.messages.added_to_queue(&song)).await;

            return Ok(Enqueued::Queued { position });
        }

        info!("ENQUEUE - New queue for guild {} starting with {}", request.guild_id.0, song.title);
        slot.set(Queue::new(request.text_channel, voice_channel, self.default_volume, song));

        if let Err(why) = self.voice.join(request.guild_id, voice_channel).await {
            warn!("ENQUEUE - Joining voice channel {} failed: {why}", voice_channel.0);
            slot.delete();

            return Err(why);
        }

        if let Some(queue) = slot.get_mut() {
            queue.connection = Some(Connection::new(queue.voice_channel));
        }

        if self.play_next(&mut slot).await {
            Ok(Enqueued::Started)
        } else {
            Ok(Enqueued::Unplayable)
        }
    }

    /// Drops the current song and starts the next one directly.
    pub async fn skip(&self, request: ControlRequest) -> Result<Option<Song>, PlaybackError> {
        if !request.issuer_in_voice {
            return Err(PlaybackError::NotInVoiceChannel(Action::Skip));
        }

        let mut slot = self.store.lock(request.guild_id).await;
        let queue = slot.get_mut().ok_or(PlaybackError::NoActiveQueue(Action::Skip))?;

        // Forget the token first: the end event of the stopped track is stale.
        release_track(queue);
        let skipped = queue.songs.pop_front();

        info!("SKIP - Skipping {:?}", skipped.as_ref().map(|song| &song.title));

        self.voice.stop(request.guild_id).await;
        self.play_next(&mut slot).await;

        Ok(skipped)
    }

    /// Clears every pending song and leaves the voice channel. Returns how many
    /// songs were dropped.
    pub async fn stop(&self, request: ControlRequest) -> Result<usize, PlaybackError> {
        if !request.issuer_in_voice {
            return Err(PlaybackError::NotInVoiceChannel(Action::Stop));
        }

        let mut slot = self.store.lock(request.guild_id).await;
        let queue = slot.get_mut().ok_or(PlaybackError::NoActiveQueue(Action::Stop))?;

        release_track(queue);
        let cleared = queue.songs.len();
        queue.songs.clear();

        info!("STOP - Cleared {cleared} songs");

        self.voice.stop(request.guild_id).await;
        self.play_next(&mut slot).await;

        Ok(cleared)
    }

    /// Completion handling for a track started with `token`.
    pub async fn track_finished(&self, guild_id: GuildId, token: TrackToken) {
        let mut slot = self.store.lock(guild_id).await;

        match slot.get_mut() {
            Some(queue) if queue.current_track() == Some(token) => {
                release_track(queue);
                let finished = queue.songs.pop_front();
                info!("FINISHED - {:?}, playing: {}", finished.map(|song| song.title), queue.playing);
            }
            _ => {
                debug!("FINISHED - Ignoring end of stale track {token:?}");
                return;
            }
        }

        self.play_next(&mut slot).await;
    }

    /// The bot was removed from the voice channel by someone else.
    pub async fn voice_disconnected(&self, guild_id: GuildId) {
        let mut slot = self.store.lock(guild_id).await;

        if slot.get().map_or(true, |queue| queue.connection.is_none()) {
            return;
        }

        // A late event from our own earlier leave arrives after a new queue
        // already rejoined; the live session tells the two apart.
        if self.voice.is_connected(guild_id).await {
            debug!("DISCONNECTED - Still connected in guild {}, ignoring stale event", guild_id.0);
            return;
        }

        if let Some(queue) = slot.delete() {
            let channel = queue.connection.map(|connection| connection.channel.0);
            info!("DISCONNECTED - Dropping {} songs of guild {} (channel {channel:?})", queue.songs.len(), guild_id.0);
        }

        self.voice.stop(guild_id).await;
    }

    /// Plays the queue head, or tears the queue down when there is none.
    /// Songs that fail to start are announced and dropped until one plays.
    /// Returns whether a song is playing afterwards.
    async fn play_next(&self, slot: &mut GuildSlot) -> bool {
        let guild_id = slot.guild_id();

        loop {
            let queue = match slot.get_mut() {
                Some(queue) => queue,
                None => return false,
            };

            let next = match queue.connection {
                Some(_) => queue.songs.front().cloned(),
                None => None,
            };

            let song = match next {
                Some(song) => song,
                None => {
                    info!("PLAY_NEXT - Queue of guild {} is over, leaving", guild_id.0);
                    self.voice.leave(guild_id).await;
                    slot.delete();

                    return false;
                }
            };

            let token = TrackToken(self.next_token.fetch_add(1, Ordering::Relaxed));
            let text_channel = queue.text_channel;

            info!("PLAY_NEXT - Next song is {} - {}", song.title, song.url);

            match self.voice.play(guild_id, &song, queue.output_volume(), token).await {
                Ok(()) => {
                    if let Some(connection) = queue.connection.as_mut() {
                        connection.track = Some(token);
                    }

                    self.voice.say(text_channel, &self.messages.now_playing(&song)).await;

                    return true;
                }
                Err(why) => {
                    error!("PLAY_NEXT - Could not start {}: {why}", song.url);
                    queue.songs.pop_front();

                    self.voice.say(text_channel, &self.messages.unplayable(&song)).await;
                }
            }
        }
    }
}

fn release_track(queue: &mut Queue) {
    if let Some(connection) = queue.connection.as_mut() {
        connection.track = None;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::messages::Language;

    const GUILD: GuildId = GuildId(100);
    const TEXT: ChannelId = ChannelId(200);
    const VOICE: ChannelId = ChannelId(300);

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Join(ChannelId),
        Play(String, TrackToken),
        Stop,
        Leave,
        Say(String),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
        connected: Arc<AtomicBool>,
    }

    impl Recorder {
        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn said(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Say(text) => Some(text),
                    _ => None,
                })
                .collect()
        }

        fn last_token(&self) -> TrackToken {
            self.calls()
                .into_iter()
                .rev()
                .find_map(|call| match call {
                    Call::Play(_, token) => Some(token),
                    _ => None,
                })
                .expect("nothing was played")
        }

        fn count(&self, wanted: &Call) -> usize {
            self.calls().iter().filter(|call| *call == wanted).count()
        }

        /// Someone else removed the bot from the voice channel.
        fn kick(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeVoice {
        recorder: Recorder,
        refuse_join: bool,
        broken_urls: HashSet<String>,
        volumes: Arc<Mutex<Vec<f32>>>,
    }

    #[async_trait]
    impl VoiceBackend for FakeVoice {
        async fn join(&self, _guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError> {
            self.recorder.push(Call::Join(channel_id));
            // Suspend like a real gateway round trip would.
            tokio::task::yield_now().await;

            if self.refuse_join {
                Err(PlaybackError::VoiceJoin("Gateway response timed out".to_string()))
            } else {
                self.recorder.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        async fn play(&self, _guild_id: GuildId, song: &Song, volume: f32, token: TrackToken) -> Result<(), PlaybackError> {
            if self.broken_urls.contains(&song.url) {
                return Err(PlaybackError::OutputStream("ffmpeg exited".to_string()));
            }

            self.volumes.lock().unwrap().push(volume);
            self.recorder.push(Call::Play(song.title.clone(), token));
            Ok(())
        }

        async fn stop(&self, _guild_id: GuildId) {
            self.recorder.push(Call::Stop);
        }

        async fn leave(&self, _guild_id: GuildId) {
            self.recorder.connected.store(false, Ordering::SeqCst);
            self.recorder.push(Call::Leave);
        }

        async fn is_connected(&self, _guild_id: GuildId) -> bool {
            self.recorder.connected.load(Ordering::SeqCst)
        }

        async fn say(&self, _channel_id: ChannelId, text: &str) {
            self.recorder.push(Call::Say(text.to_string()));
        }
    }

    /// Every query `q` resolves to `https://youtube.test/q` titled `Q title`.
    #[derive(Default)]
    struct FakeResolver {
        unknown_queries: HashSet<String>,
        private_videos: HashSet<String>,
        searches: Arc<Mutex<HashMap<String, usize>>>,
    }

    #[async_trait]
    impl Resolver for FakeResolver {
        async fn search(&self, query: &str) -> Result<String, PlaybackError> {
            *self.searches.lock().unwrap().entry(query.to_string()).or_default() += 1;
            tokio::task::yield_now().await;

            if self.unknown_queries.contains(query) {
                return Err(PlaybackError::SearchResolution {
                    query: query.to_string(),
                    reason: "no results".to_string(),
                });
            }

            Ok(format!("https://youtube.test/{}", query.replace(' ', "-")))
        }

        async fn metadata(&self, url: &str) -> Result<Song, PlaybackError> {
            if self.private_videos.contains(url) {
                return Err(PlaybackError::MetadataResolution {
                    url: url.to_string(),
                    reason: "Private video".to_string(),
                });
            }

            let slug = url.rsplit('/').next().unwrap_or_default();

            Ok(Song {
                title: format!("{} title", slug.replace('-', " ")),
                url: url.to_string(),
                duration: Some(Duration::from_secs(180)),
            })
        }
    }

    type TestController = PlaybackController<FakeResolver, FakeVoice>;

    fn controller_with(voice: FakeVoice, resolver: FakeResolver) -> (TestController, Recorder) {
        let recorder = voice.recorder.clone();
        let controller = PlaybackController::new(resolver, voice, Messages::new(Language::English), 6.0);

        (controller, recorder)
    }

    fn controller() -> (TestController, Recorder) {
        controller_with(FakeVoice::default(), FakeResolver::default())
    }

    fn play(query: &str) -> PlayRequest {
        PlayRequest {
            guild_id: GUILD,
            text_channel: TEXT,
            voice_channel: Some(VOICE),
            can_connect_and_speak: true,
            query: query.to_string(),
        }
    }

    fn control(issuer_in_voice: bool) -> ControlRequest {
        ControlRequest {
            guild_id: GUILD,
            issuer_in_voice,
        }
    }

    async fn titles(controller: &TestController) -> Vec<String> {
        controller.songs(GUILD).await.into_iter().map(|song| song.title).collect()
    }

    #[tokio::test]
    async fn sequential_enqueues_keep_fifo_order() {
        let (controller, recorder) = controller();

        assert_eq!(controller.enqueue(play("one")).await, Ok(Enqueued::Started));
        assert_eq!(controller.enqueue(play("two")).await, Ok(Enqueued::Queued { position: 2 }));
        assert_eq!(controller.enqueue(play("three")).await, Ok(Enqueued::Queued { position: 3 }));

        assert_eq!(titles(&controller).await, ["one title", "two title", "three title"]);
        assert_eq!(recorder.count(&Call::Join(VOICE)), 1);
    }

    #[tokio::test]
    async fn first_enqueue_creates_queue_and_plays() {
        let (controller, recorder) = controller();

        controller.enqueue(play("lofi beats")).await.unwrap();

        let queue = controller.store.get(GUILD).await.unwrap();
        assert!(queue.playing);
        assert_eq!(queue.volume, 6.0);
        assert_eq!(queue.text_channel, TEXT);
        assert_eq!(queue.voice_channel, VOICE);
        assert_eq!(queue.connection.as_ref().map(|connection| connection.channel), Some(VOICE));
        assert_eq!(queue.current_track(), Some(recorder.last_token()));
        assert_eq!(recorder.said(), ["Now playing: **lofi beats title**"]);
    }

    #[tokio::test]
    async fn output_volume_is_a_fifth_of_queue_volume() {
        let voice = FakeVoice::default();
        let volumes = voice.volumes.clone();
        let (controller, _) = controller_with(voice, FakeResolver::default());

        controller.enqueue(play("one")).await.unwrap();

        let volumes = volumes.lock().unwrap().clone();
        assert_eq!(volumes.len(), 1);
        assert!((volumes[0] - 1.2).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn racing_first_enqueues_create_a_single_queue() {
        let (controller, recorder) = controller();

        let (first, second) = tokio::join!(controller.enqueue(play("one")), controller.enqueue(play("two")));

        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|outcome| matches!(outcome, Enqueued::Queued { .. }));

        assert_eq!(outcomes, [Enqueued::Started, Enqueued::Queued { position: 2 }]);
        assert_eq!(recorder.count(&Call::Join(VOICE)), 1);
        assert_eq!(controller.songs(GUILD).await.len(), 2);
    }

    #[tokio::test]
    async fn scenario_two_songs_play_out_and_queue_disappears() {
        let (controller, recorder) = controller();

        controller.enqueue(play("lofi beats")).await.unwrap();
        controller.enqueue(play("jazz")).await.unwrap();

        assert_eq!(titles(&controller).await, ["lofi beats title", "jazz title"]);
        assert!(recorder.said().contains(&"jazz title was added to the queue!".to_string()));

        controller.track_finished(GUILD, recorder.last_token()).await;

        assert_eq!(titles(&controller).await, ["jazz title"]);
        assert_eq!(recorder.said().last().map(String::as_str), Some("Now playing: **jazz title**"));

        controller.track_finished(GUILD, recorder.last_token()).await;

        assert!(controller.store.get(GUILD).await.is_none());
        assert_eq!(recorder.calls().last(), Some(&Call::Leave));
    }

    #[tokio::test]
    async fn stale_finish_events_are_ignored() {
        let (controller, recorder) = controller();

        controller.enqueue(play("one")).await.unwrap();
        controller.enqueue(play("two")).await.unwrap();
        let first_token = recorder.last_token();

        controller.track_finished(GUILD, first_token).await;
        controller.track_finished(GUILD, first_token).await;

        assert_eq!(titles(&controller).await, ["two title"]);
    }

    #[tokio::test]
    async fn join_failure_removes_queue_with_curated_error() {
        let voice = FakeVoice {
            refuse_join: true,
            ..FakeVoice::default()
        };
        let (controller, recorder) = controller_with(voice, FakeResolver::default());

        let error = controller.enqueue(play("one")).await.unwrap_err();

        assert!(matches!(error, PlaybackError::VoiceJoin(_)));
        assert!(controller.store.get(GUILD).await.is_none());
        assert_eq!(controller.messages().for_error(&error), "I couldn't join your voice channel!");
        assert!(recorder.said().is_empty());
    }

    #[tokio::test]
    async fn enqueue_preconditions_leave_store_untouched() {
        let (controller, recorder) = controller();

        let mut not_in_voice = play("one");
        not_in_voice.voice_channel = None;
        assert_eq!(
            controller.enqueue(not_in_voice).await,
            Err(PlaybackError::NotInVoiceChannel(Action::Play))
        );

        let mut no_permission = play("one");
        no_permission.can_connect_and_speak = false;
        assert_eq!(controller.enqueue(no_permission).await, Err(PlaybackError::InsufficientPermissions));

        assert_eq!(controller.enqueue(play("   ")).await, Err(PlaybackError::MissingQuery));

        assert!(controller.store.get(GUILD).await.is_none());
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn search_failure_aborts_enqueue() {
        let resolver = FakeResolver {
            unknown_queries: HashSet::from(["nothing here".to_string()]),
            ..FakeResolver::default()
        };
        let (controller, recorder) = controller_with(FakeVoice::default(), resolver);

        let error = controller.enqueue(play("nothing here")).await.unwrap_err();

        assert!(matches!(error, PlaybackError::SearchResolution { .. }));
        assert!(controller.store.get(GUILD).await.is_none());
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn metadata_failure_aborts_enqueue() {
        let resolver = FakeResolver {
            private_videos: HashSet::from(["https://youtube.test/private".to_string()]),
            ..FakeResolver::default()
        };
        let (controller, recorder) = controller_with(FakeVoice::default(), resolver);

        let error = controller.enqueue(play("private")).await.unwrap_err();

        assert!(matches!(error, PlaybackError::MetadataResolution { .. }));
        assert!(controller.store.get(GUILD).await.is_none());
        assert!(recorder.calls().is_empty());
        assert_eq!(controller.messages().for_error(&error), "I couldn't load that video's information!");
    }

    #[tokio::test]
    async fn urls_skip_the_search_step() {
        let resolver = FakeResolver::default();
        let searches = resolver.searches.clone();
        let (controller, _) = controller_with(FakeVoice::default(), resolver);

        controller.enqueue(play("https://youtube.test/direct")).await.unwrap();

        assert!(searches.lock().unwrap().is_empty());
        assert_eq!(titles(&controller).await, ["direct title"]);
    }

    #[tokio::test]
    async fn skip_outside_voice_only_replies() {
        let (controller, recorder) = controller();
        controller.enqueue(play("one")).await.unwrap();
        let before = recorder.calls();

        let error = controller.skip(control(false)).await.unwrap_err();

        assert_eq!(error, PlaybackError::NotInVoiceChannel(Action::Skip));
        assert_eq!(
            Messages::new(Language::Portuguese).for_error(&error),
            "Você precisa estar em um canal de voz para pular a música!"
        );
        assert_eq!(recorder.calls(), before);
        assert_eq!(titles(&controller).await, ["one title"]);
    }

    #[tokio::test]
    async fn skip_without_queue_reports_no_songs() {
        let (controller, _) = controller();

        assert_eq!(controller.skip(control(true)).await, Err(PlaybackError::NoActiveQueue(Action::Skip)));
    }

    #[tokio::test]
    async fn skip_advances_directly_and_ignores_the_stopped_track() {
        let (controller, recorder) = controller();
        controller.enqueue(play("one")).await.unwrap();
        controller.enqueue(play("two")).await.unwrap();
        let stopped = recorder.last_token();

        let skipped = controller.skip(control(true)).await.unwrap();

        assert_eq!(skipped.map(|song| song.title), Some("one title".to_string()));
        assert_eq!(titles(&controller).await, ["two title"]);
        assert_eq!(recorder.said().last().map(String::as_str), Some("Now playing: **two title**"));

        // The stopped track's end event arrives afterwards.
        controller.track_finished(GUILD, stopped).await;
        assert_eq!(titles(&controller).await, ["two title"]);
    }

    #[tokio::test]
    async fn skipping_the_last_song_ends_the_queue() {
        let (controller, recorder) = controller();
        controller.enqueue(play("one")).await.unwrap();

        controller.skip(control(true)).await.unwrap();

        assert!(controller.store.get(GUILD).await.is_none());
        assert_eq!(recorder.count(&Call::Leave), 1);
    }

    #[tokio::test]
    async fn stop_clears_everything_and_nothing_else_plays() {
        let (controller, recorder) = controller();
        for query in ["one", "two", "three"] {
            controller.enqueue(play(query)).await.unwrap();
        }
        let playing = recorder.last_token();

        assert_eq!(controller.stop(control(true)).await, Ok(3));

        // End event of the stopped track.
        controller.track_finished(GUILD, playing).await;

        assert!(controller.store.get(GUILD).await.is_none());
        assert_eq!(recorder.count(&Call::Leave), 1);
        let now_playing = recorder.said().iter().filter(|text| text.starts_with("Now playing")).count();
        assert_eq!(now_playing, 1);
    }

    #[tokio::test]
    async fn stop_outside_voice_is_rejected() {
        let (controller, _) = controller();
        controller.enqueue(play("one")).await.unwrap();

        assert_eq!(controller.stop(control(false)).await, Err(PlaybackError::NotInVoiceChannel(Action::Stop)));
        assert_eq!(titles(&controller).await, ["one title"]);
    }

    #[tokio::test]
    async fn unplayable_songs_are_dropped_and_the_next_one_plays() {
        let voice = FakeVoice {
            broken_urls: HashSet::from(["https://youtube.test/broken".to_string()]),
            ..FakeVoice::default()
        };
        let (controller, recorder) = controller_with(voice, FakeResolver::default());

        assert_eq!(controller.enqueue(play("broken")).await, Ok(Enqueued::Unplayable));

        assert!(controller.store.get(GUILD).await.is_none());
        assert_eq!(recorder.said(), ["Could not play **broken title**, skipping."]);

        controller.enqueue(play("one")).await.unwrap();
        controller.enqueue(play("broken")).await.unwrap();
        controller.enqueue(play("two")).await.unwrap();
        controller.track_finished(GUILD, recorder.last_token()).await;

        assert_eq!(titles(&controller).await, ["two title"]);
    }

    #[tokio::test]
    async fn external_disconnect_drops_the_queue() {
        let (controller, recorder) = controller();
        controller.enqueue(play("one")).await.unwrap();
        controller.enqueue(play("two")).await.unwrap();

        recorder.kick();
        controller.voice_disconnected(GUILD).await;

        assert!(controller.store.get(GUILD).await.is_none());
        assert_eq!(recorder.calls().last(), Some(&Call::Stop));

        controller.voice_disconnected(GUILD).await;
        assert_eq!(recorder.count(&Call::Stop), 1);
    }

    #[tokio::test]
    async fn late_disconnect_from_own_leave_keeps_the_new_queue() {
        let (controller, recorder) = controller();
        controller.enqueue(play("one")).await.unwrap();

        // Last song ends: the bot leaves and the queue is gone.
        controller.track_finished(GUILD, recorder.last_token()).await;
        assert!(controller.store.get(GUILD).await.is_none());

        // A new play rejoins before the gateway reports the earlier leave.
        controller.enqueue(play("two")).await.unwrap();
        controller.voice_disconnected(GUILD).await;

        assert_eq!(titles(&controller).await, ["two title"]);
        assert_eq!(recorder.count(&Call::Stop), 0);
    }
}
