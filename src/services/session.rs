use std::sync::{Mutex, MutexGuard};

use reqwest::Url;
use tokio::sync::watch;

use crate::domain::credential::Credential;
use crate::domain::redirect::{RedirectGrant, parse_fragment};
use crate::domain::view::{SessionPhase, ViewState};
use crate::infrastructure::frame::{Address, FrameHost, Navigator};
use crate::services::credential_store::CredentialStore;
use crate::services::error::ConnectError;
use crate::services::fetcher::{FetchOutcome, NowPlayingApi, NowPlayingFetcher};
use crate::services::view_store::ViewStore;

/// Drives the credential lifecycle and feeds fetch outcomes into the view.
///
/// All triggers (mount, redirect, manual refresh) run on the caller's task;
/// concurrent fetches are reconciled by the [`ViewStore`] sequence guard.
pub struct SessionController<S, A> {
    store: S,
    fetcher: NowPlayingFetcher<A>,
    view: ViewStore,
    login_url: Url,
    /// Token the service rejected but the store failed to forget.
    rejected: Mutex<Option<Credential>>,
}

impl<S: CredentialStore, A: NowPlayingApi> SessionController<S, A> {
    pub fn new(store: S, fetcher: NowPlayingFetcher<A>, login_url: Url) -> Self {
        Self {
            store,
            fetcher,
            view: ViewStore::new(),
            login_url,
            rejected: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    pub fn view(&self) -> ViewState {
        self.view.snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.view.phase()
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs both load-time checks, signals the host ready, then resolves the
    /// fetches the checks triggered.
    pub async fn mount(&self, address: &mut dyn Address, host: &dyn FrameHost) {
        let stored = self.resume_stored();
        let delivered = self.accept_redirect(address);
        host.ready();

        tokio::join!(self.fetch_opt(stored), self.fetch_opt(delivered));
    }

    /// Re-fetches with the stored credential. Without one this does nothing.
    pub async fn refresh(&self) {
        let Some(credential) = self.usable_credential() else {
            tracing::debug!("Refresh ignored: not connected");
            return;
        };
        self.fetch_with(credential).await;
    }

    pub fn connect(&self, navigator: &dyn Navigator) -> Result<(), ConnectError> {
        navigator.navigate(&self.login_url)
    }

    fn resume_stored(&self) -> Option<Credential> {
        let Some(credential) = self.usable_credential() else {
            tracing::info!("No stored access token");
            return None;
        };
        tracing::info!("Resuming session from stored access token");
        self.view.set_authenticated(true);
        Some(credential)
    }

    fn accept_redirect(&self, address: &mut dyn Address) -> Option<Credential> {
        let fragment = address.fragment()?;

        match parse_fragment(&fragment)? {
            RedirectGrant::Token {
                credential,
                token_type,
                expires_in,
            } => {
                tracing::info!(?token_type, ?expires_in, "Received access token from redirect");
                address.clear_fragment();
                if let Err(e) = self.store.write(&credential) {
                    tracing::warn!("Failed to persist access token: {e}");
                }
                self.view.set_authenticated(true);
                Some(credential)
            }
            RedirectGrant::Denied { error, description } => {
                tracing::warn!(?description, "Authorization was not granted: {error}");
                address.clear_fragment();
                None
            }
        }
    }

    fn usable_credential(&self) -> Option<Credential> {
        let credential = self.store.read()?;
        if self.rejected().as_ref() == Some(&credential) {
            tracing::debug!("Stored access token was already rejected");
            return None;
        }
        Some(credential)
    }

    async fn fetch_opt(&self, credential: Option<Credential>) {
        if let Some(credential) = credential {
            self.fetch_with(credential).await;
        }
    }

    async fn fetch_with(&self, credential: Credential) {
        let loading = self.view.begin_fetch();
        let outcome = self.fetcher.fetch(&credential).await;

        match &outcome {
            FetchOutcome::Expired => self.expire(&credential),
            FetchOutcome::Empty => tracing::debug!("Nothing playing and no play history"),
            _ => {}
        }
        self.view.apply(loading.seq(), &outcome);
    }

    fn expire(&self, credential: &Credential) {
        match self.store.clear_if_current(credential) {
            Ok(true) => {
                tracing::info!("Access token expired; disconnecting");
                self.view.set_authenticated(false);
            }
            Ok(false) => {
                tracing::debug!("Expired token is no longer stored");
                self.view.set_authenticated(self.usable_credential().is_some());
            }
            Err(e) => {
                tracing::warn!("Failed to clear expired access token: {e}");
                *self.rejected() = Some(credential.clone());
                self.view.set_authenticated(false);
            }
        }
    }

    fn rejected(&self) -> MutexGuard<'_, Option<Credential>> {
        self.rejected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;
    use crate::services::credential_store::MemoryCredentialStore;
    use crate::services::error::StoreError;
    use crate::services::fetcher::CurrentlyPlaying;
    use crate::services::fetcher::testing::{FakeApi, Reply, active, track};

    struct TestAddress {
        fragment: Option<String>,
    }

    impl TestAddress {
        fn empty() -> Self {
            Self { fragment: None }
        }

        fn with(fragment: &str) -> Self {
            Self {
                fragment: Some(fragment.to_string()),
            }
        }
    }

    impl Address for TestAddress {
        fn fragment(&self) -> Option<String> {
            self.fragment.clone()
        }

        fn clear_fragment(&mut self) {
            self.fragment = None;
        }
    }

    #[derive(Default)]
    struct CountingHost {
        readies: AtomicUsize,
    }

    impl FrameHost for CountingHost {
        fn ready(&self) {
            self.readies.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        visited: RefCell<Vec<String>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, url: &Url) -> Result<(), ConnectError> {
            self.visited.borrow_mut().push(url.to_string());
            Ok(())
        }
    }

    /// Memory slot whose writes or clears can be made to fail.
    #[derive(Default)]
    struct FaultyStore {
        inner: MemoryCredentialStore,
        fail_write: bool,
        fail_clear: bool,
    }

    fn read_only() -> StoreError {
        StoreError::Io {
            path: PathBuf::from("/read-only/access_token"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
        }
    }

    impl CredentialStore for FaultyStore {
        fn read(&self) -> Option<Credential> {
            self.inner.read()
        }

        fn write(&self, credential: &Credential) -> Result<(), StoreError> {
            if self.fail_write {
                return Err(read_only());
            }
            self.inner.write(credential)
        }

        fn clear(&self) -> Result<(), StoreError> {
            if self.fail_clear {
                return Err(read_only());
            }
            self.inner.clear()
        }
    }

    fn token(value: &str) -> Credential {
        Credential::new(value).unwrap()
    }

    fn controller<S: CredentialStore>(store: S, api: FakeApi) -> SessionController<S, FakeApi> {
        SessionController::new(
            store,
            NowPlayingFetcher::new(api),
            Url::parse("http://localhost:3000/api/login").unwrap(),
        )
    }

    #[tokio::test]
    async fn mount_without_token_issues_no_fetch() {
        let api = FakeApi::new();
        let session = controller(MemoryCredentialStore::new(), api.clone());
        let host = CountingHost::default();

        session.mount(&mut TestAddress::empty(), &host).await;

        assert_eq!(api.total_calls(), 0);
        assert!(!session.view().is_authenticated);
        assert_eq!(session.phase(), SessionPhase::Unauthenticated);
        assert_eq!(host.readies.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stored_token_shows_currently_playing() {
        let api = FakeApi::new().current(active(track("t1", "Song A")));
        let store = MemoryCredentialStore::with_credential(token("tok1"));
        let session = controller(store, api.clone());

        session
            .mount(&mut TestAddress::empty(), &CountingHost::default())
            .await;

        let view = session.view();
        assert_eq!(view.track().unwrap().name, "Song A");
        assert!(view.is_playing());
        assert!(view.is_authenticated);
        assert!(!view.is_loading);
        assert_eq!(*api.tokens_seen.lock().unwrap(), vec!["tok1".to_string()]);
    }

    #[tokio::test]
    async fn falls_back_to_recently_played() {
        let api = FakeApi::new()
            .current(Reply::Ok(CurrentlyPlaying::NothingActive))
            .recent(Reply::Ok(Some(track("t2", "Song B"))));
        let store = MemoryCredentialStore::with_credential(token("tok1"));
        let session = controller(store, api);

        session
            .mount(&mut TestAddress::empty(), &CountingHost::default())
            .await;

        let view = session.view();
        assert_eq!(view.track().unwrap().name, "Song B");
        assert!(!view.is_playing());
    }

    #[tokio::test]
    async fn redirect_fragment_is_persisted_and_stripped() {
        let api = FakeApi::new().current(active(track("t1", "Song A")));
        let session = controller(MemoryCredentialStore::new(), api.clone());
        let mut address = TestAddress::with("#access_token=abc123&token_type=Bearer");

        session.mount(&mut address, &CountingHost::default()).await;

        assert_eq!(session.store().read(), Some(token("abc123")));
        assert_eq!(address.fragment, None);
        assert!(session.view().is_authenticated);
        assert_eq!(*api.tokens_seen.lock().unwrap(), vec!["abc123".to_string()]);
    }

    #[tokio::test]
    async fn denied_redirect_is_stripped_without_connecting() {
        let api = FakeApi::new();
        let session = controller(MemoryCredentialStore::new(), api.clone());
        let mut address = TestAddress::with("#error=access_denied");

        session.mount(&mut address, &CountingHost::default()).await;

        assert_eq!(address.fragment, None);
        assert!(session.store().read().is_none());
        assert!(!session.view().is_authenticated);
        assert_eq!(api.total_calls(), 0);
    }

    #[tokio::test]
    async fn unrelated_fragment_is_left_alone() {
        let session = controller(MemoryCredentialStore::new(), FakeApi::new());
        let mut address = TestAddress::with("#about");

        session.mount(&mut address, &CountingHost::default()).await;

        assert_eq!(address.fragment.as_deref(), Some("#about"));
    }

    #[tokio::test]
    async fn expired_token_is_cleared_and_refresh_becomes_noop() {
        let api = FakeApi::new().current(Reply::Unauthorized);
        let store = MemoryCredentialStore::with_credential(token("tok1"));
        let session = controller(store, api.clone());

        session
            .mount(&mut TestAddress::empty(), &CountingHost::default())
            .await;

        assert!(session.store().read().is_none());
        assert!(!session.view().is_authenticated);
        assert_eq!(session.phase(), SessionPhase::Unauthenticated);

        session.refresh().await;
        assert_eq!(api.total_calls(), 1);
    }

    #[tokio::test]
    async fn write_then_expire_then_read_is_absent() {
        let api = FakeApi::new().current(Reply::Unauthorized);
        let session = controller(MemoryCredentialStore::new(), api);
        let mut address = TestAddress::with("access_token=short-lived");

        session.mount(&mut address, &CountingHost::default()).await;

        assert!(session.store().read().is_none());
        assert!(!session.view().is_authenticated);
    }

    #[tokio::test]
    async fn empty_and_failed_fetches_keep_previous_track() {
        let api = FakeApi::new()
            .current(active(track("t1", "Song A")))
            .current(Reply::Ok(CurrentlyPlaying::NothingActive))
            .recent(Reply::Ok(None))
            .current(Reply::Status(500));
        let store = MemoryCredentialStore::with_credential(token("tok1"));
        let session = controller(store, api);
        session
            .mount(&mut TestAddress::empty(), &CountingHost::default())
            .await;
        let before = session.view();

        let mut rx = session.subscribe();
        rx.borrow_and_update();
        session.refresh().await;
        session.refresh().await;

        assert_eq!(session.view(), before);
        assert!(session.view().is_authenticated);
        // Loading toggled, but playback was never rebroadcast with new content.
        assert_eq!(rx.borrow_and_update().playback, before.playback);
    }

    #[tokio::test]
    async fn loading_spans_the_whole_fetch_including_fallback() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi::gated(gate.clone())
            .current(Reply::Ok(CurrentlyPlaying::NothingActive))
            .recent(Reply::Ok(Some(track("t2", "Song B"))));
        let store = MemoryCredentialStore::with_credential(token("tok1"));
        let session = controller(store, api.clone());
        let rx = session.subscribe();

        assert!(!rx.borrow().is_loading);

        let refresh = session.refresh();
        tokio::pin!(refresh);

        // First call in flight.
        tokio::select! {
            _ = &mut refresh => panic!("fetch resolved before the transport replied"),
            _ = tokio::task::yield_now() => {}
        }
        assert!(rx.borrow().is_loading);
        assert_eq!(api.current_calls.load(Ordering::SeqCst), 1);

        // Fallback call in flight.
        gate.notify_one();
        tokio::select! {
            _ = &mut refresh => panic!("fetch resolved before the fallback replied"),
            _ = tokio::task::yield_now() => {}
        }
        assert!(rx.borrow().is_loading);
        assert_eq!(api.recent_calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        refresh.await;
        assert!(!rx.borrow().is_loading);
        assert_eq!(rx.borrow().track().unwrap().name, "Song B");
    }

    #[tokio::test]
    async fn loading_resets_on_every_outcome() {
        let replies = [
            active(track("t1", "Song A")),
            Reply::Unauthorized,
            Reply::Status(502),
        ];
        for reply in replies {
            let api = FakeApi::new().current(reply);
            let store = MemoryCredentialStore::with_credential(token("tok1"));
            let session = controller(store, api);

            session.refresh().await;

            assert!(!session.view().is_loading);
        }
    }

    #[tokio::test]
    async fn stale_expiry_does_not_clear_fresh_redirect_token() {
        let gate = Arc::new(Notify::new());
        // Stored token is rejected; the redirect token succeeds.
        let api = FakeApi::gated(gate.clone())
            .current(Reply::Unauthorized)
            .current(active(track("t1", "Song A")));
        let store = MemoryCredentialStore::with_credential(token("old"));
        let session = controller(store, api.clone());
        let mut address = TestAddress::with("#access_token=new");
        let host = CountingHost::default();

        let mount = session.mount(&mut address, &host);
        tokio::pin!(mount);
        tokio::select! {
            _ = &mut mount => panic!("mount finished before fetches replied"),
            _ = tokio::task::yield_now() => {}
        }
        assert_eq!(
            *api.tokens_seen.lock().unwrap(),
            vec!["old".to_string(), "new".to_string()]
        );
        assert_eq!(session.phase(), SessionPhase::Authenticating);

        gate.notify_one();
        gate.notify_one();
        mount.await;

        assert_eq!(session.store().read(), Some(token("new")));
        let view = session.view();
        assert!(view.is_authenticated);
        assert!(!view.is_loading);
        assert_eq!(view.track().unwrap().name, "Song A");
        assert_eq!(host.readies.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_navigates_to_login_route() {
        let session = controller(MemoryCredentialStore::new(), FakeApi::new());
        let navigator = RecordingNavigator::default();

        session.connect(&navigator).unwrap();

        assert_eq!(
            *navigator.visited.borrow(),
            vec!["http://localhost:3000/api/login".to_string()]
        );
    }

    #[tokio::test]
    async fn unpersisted_redirect_token_disconnects_on_expiry() {
        let api = FakeApi::new().current(Reply::Unauthorized);
        let store = FaultyStore {
            fail_write: true,
            ..FaultyStore::default()
        };
        let session = controller(store, api.clone());
        let mut address = TestAddress::with("#access_token=abc");

        session.mount(&mut address, &CountingHost::default()).await;

        assert!(session.store().read().is_none());
        assert!(!session.view().is_authenticated);
        assert_eq!(session.phase(), SessionPhase::Unauthenticated);

        session.refresh().await;
        assert_eq!(api.total_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_token_is_not_reused_when_clear_fails() {
        let api = FakeApi::new().current(Reply::Unauthorized);
        let store = FaultyStore {
            inner: MemoryCredentialStore::with_credential(token("tok1")),
            fail_clear: true,
            ..FaultyStore::default()
        };
        let session = controller(store, api.clone());

        session
            .mount(&mut TestAddress::empty(), &CountingHost::default())
            .await;

        assert_eq!(session.store().read(), Some(token("tok1")));
        assert!(!session.view().is_authenticated);

        session.refresh().await;
        assert_eq!(api.total_calls(), 1);
        assert!(!session.view().is_authenticated);
    }

    #[tokio::test]
    async fn fresh_token_replaces_one_the_store_could_not_clear() {
        let api = FakeApi::new()
            .current(Reply::Unauthorized)
            .current(active(track("t1", "Song A")));
        let store = FaultyStore {
            inner: MemoryCredentialStore::with_credential(token("tok1")),
            fail_clear: true,
            ..FaultyStore::default()
        };
        let session = controller(store, api.clone());
        session
            .mount(&mut TestAddress::empty(), &CountingHost::default())
            .await;

        session
            .mount(
                &mut TestAddress::with("#access_token=tok2"),
                &CountingHost::default(),
            )
            .await;
        session.refresh().await;

        assert!(session.view().is_authenticated);
        assert_eq!(
            *api.tokens_seen.lock().unwrap(),
            vec!["tok1".to_string(), "tok2".to_string(), "tok2".to_string()]
        );
    }

    #[tokio::test]
    async fn ready_fires_before_fetches_resolve() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi::gated(gate).current(active(track("t1", "Song A")));
        let store = MemoryCredentialStore::with_credential(token("tok1"));
        let session = controller(store, api.clone());
        let host = CountingHost::default();

        let mut address = TestAddress::empty();
        let mount = session.mount(&mut address, &host);
        tokio::pin!(mount);
        // The gate is never opened.
        tokio::select! {
            _ = &mut mount => panic!("mount finished before the transport replied"),
            _ = tokio::task::yield_now() => {}
        }

        assert_eq!(host.readies.load(Ordering::SeqCst), 1);
        assert_eq!(api.current_calls.load(Ordering::SeqCst), 1);
        assert!(session.view().is_loading);
    }

    #[tokio::test]
    async fn refresh_with_nothing_playing_stays_authenticated() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi::gated(gate.clone())
            .current(Reply::Ok(CurrentlyPlaying::NothingActive))
            .recent(Reply::Ok(None))
            .current(Reply::Ok(CurrentlyPlaying::NothingActive));
        let store = MemoryCredentialStore::with_credential(token("tok1"));
        let session = controller(store, api);

        let mut address = TestAddress::empty();
        let host = CountingHost::default();
        let mount = session.mount(&mut address, &host);
        tokio::pin!(mount);
        tokio::select! {
            _ = &mut mount => panic!("mount finished before the transport replied"),
            _ = tokio::task::yield_now() => {}
        }
        assert_eq!(session.phase(), SessionPhase::Authenticating);
        gate.notify_one();
        tokio::select! {
            _ = &mut mount => panic!("mount finished before the fallback replied"),
            _ = tokio::task::yield_now() => {}
        }
        gate.notify_one();
        mount.await;
        assert!(session.view().track().is_none());
        assert_eq!(session.phase(), SessionPhase::Authenticated);

        let refresh = session.refresh();
        tokio::pin!(refresh);
        tokio::select! {
            _ = &mut refresh => panic!("refresh resolved before the transport replied"),
            _ = tokio::task::yield_now() => {}
        }
        assert!(session.view().is_loading);
        assert_eq!(session.phase(), SessionPhase::Authenticated);
    }
}
