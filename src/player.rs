use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

use crate::error::{Error, Result};
use crate::history::HistoryEntry;
use crate::session::Selection;
use crate::store::LibraryStore;
use crate::types::Translation;

pub const PLAYER_ENV_KEY: &str = "ANI_CLI_PLAYER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Play,
    Download,
}

impl Action {
    pub fn verb(self) -> &'static str {
        match self {
            Action::Play => "Playing",
            Action::Download => "Downloading",
        }
    }
}

/// Everything ani-cli needs to find and start one episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub quality: String,
    pub translation: Translation,
    pub action: Action,
    pub index: usize,
    pub episode: String,
    pub query: String,
    pub title: String,
}

impl LaunchRequest {
    pub fn from_selection(
        selection: &Selection,
        quality: &str,
        translation: Translation,
        action: Action,
    ) -> Result<Self> {
        let query = selection
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .ok_or(Error::SelectionIncomplete { missing: "search query" })?;
        let index = selection
            .index
            .filter(|i| *i > 0)
            .ok_or(Error::SelectionIncomplete { missing: "anime" })?;
        let episode = selection
            .episode
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or(Error::SelectionIncomplete { missing: "episode" })?;

        Ok(Self {
            quality: quality.to_string(),
            translation,
            action,
            index,
            episode: episode.to_string(),
            query: query.to_string(),
            title: selection.title.clone().unwrap_or_else(|| query.to_string()),
        })
    }

    /// `-q <quality> [--dub] [-d] -S <index> -e <episode> <query>`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-q".to_string(), self.quality.clone()];
        if self.translation == Translation::Dub {
            args.push("--dub".to_string());
        }
        if self.action == Action::Download {
            args.push("-d".to_string());
        }
        args.extend([
            "-S".to_string(),
            self.index.to_string(),
            "-e".to_string(),
            self.episode.clone(),
            self.query.clone(),
        ]);
        args
    }
}

/// Starts ani-cli without waiting on it. ani-cli owns playback from there.
#[derive(Debug, Clone)]
pub struct PlaybackLauncher {
    program: String,
    leading_args: Vec<String>,
    player: Option<String>,
}

impl PlaybackLauncher {
    /// `ani_cli` may carry leading arguments, e.g. `bash /opt/ani-cli/ani-cli`.
    pub fn new(ani_cli: &str, player: Option<&str>) -> Result<Self> {
        let mut words = shlex::split(ani_cli)
            .filter(|words| !words.is_empty())
            .ok_or_else(|| Error::Config(format!("cannot parse ani-cli command {ani_cli:?}")))?;
        let program = words.remove(0);
        Ok(Self {
            program,
            leading_args: words,
            player: player
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }

    pub fn command_line(&self, request: &LaunchRequest) -> Vec<String> {
        let mut line = vec![self.program.clone()];
        line.extend(self.leading_args.iter().cloned());
        line.extend(request.args());
        line
    }

    /// Spawns detached; a play launch is added to the watch history.
    pub fn launch(&self, request: &LaunchRequest, store: &mut LibraryStore) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(request.args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(player) = &self.player {
            cmd.env(PLAYER_ENV_KEY, player);
        }

        // The child handle is dropped on purpose: exit status is ani-cli's business.
        cmd.spawn().map_err(|err| Error::Launch {
            program: self.program.clone(),
            reason: if err.kind() == std::io::ErrorKind::NotFound {
                "not found; install ani-cli or set `ani_cli` in the config".to_string()
            } else {
                err.to_string()
            },
        })?;
        info!(
            action = request.action.verb(),
            title = %request.title,
            episode = %request.episode,
            "ani-cli started"
        );

        if request.action == Action::Play {
            store.record_history(HistoryEntry::new(
                &request.title,
                &request.episode,
                &request.query,
                request.index,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_selection() -> Selection {
        Selection {
            query: Some("Example".into()),
            index: Some(3),
            id: Some("abc".into()),
            title: Some("Example Show".into()),
            episode: Some("12".into()),
        }
    }

    fn position(args: &[String], needle: &str) -> usize {
        args.iter().position(|a| a == needle).unwrap()
    }

    #[test]
    fn dub_play_arguments_keep_flag_order() {
        let req =
            LaunchRequest::from_selection(&full_selection(), "720p", Translation::Dub, Action::Play)
                .unwrap();
        let args = req.args();

        assert_eq!(args[position(&args, "-q") + 1], "720p");
        assert_eq!(args[position(&args, "-S") + 1], "3");
        assert_eq!(args[position(&args, "-e") + 1], "12");
        assert!(position(&args, "-q") < position(&args, "--dub"));
        assert!(position(&args, "--dub") < position(&args, "-S"));
        assert!(position(&args, "-S") < position(&args, "-e"));
        assert_eq!(args.last().map(String::as_str), Some("Example"));
        assert!(!args.contains(&"-d".to_string()));
    }

    #[test]
    fn sub_download_adds_d_and_no_dub() {
        let req = LaunchRequest::from_selection(
            &full_selection(),
            "best",
            Translation::Sub,
            Action::Download,
        )
        .unwrap();
        assert_eq!(
            req.args(),
            vec!["-q", "best", "-d", "-S", "3", "-e", "12", "Example"]
        );
    }

    #[test]
    fn incomplete_selection_is_rejected() {
        for (strip, missing) in [(0, "search query"), (1, "anime"), (2, "episode")] {
            let mut sel = full_selection();
            match strip {
                0 => sel.query = None,
                1 => sel.index = None,
                _ => sel.episode = Some(String::new()),
            }
            let err = LaunchRequest::from_selection(&sel, "best", Translation::Sub, Action::Play)
                .unwrap_err();
            assert!(
                matches!(err, Error::SelectionIncomplete { missing: m } if m == missing),
                "{err:?}"
            );
        }
    }

    #[test]
    fn launcher_splits_program_words() {
        let launcher = PlaybackLauncher::new("bash '/opt/ani cli/ani-cli'", Some(" vlc ")).unwrap();
        let req =
            LaunchRequest::from_selection(&full_selection(), "480p", Translation::Sub, Action::Play)
                .unwrap();
        let line = launcher.command_line(&req);
        assert_eq!(&line[..3], ["bash", "/opt/ani cli/ani-cli", "-q"]);
        assert_eq!(launcher.player.as_deref(), Some("vlc"));
        assert!(PlaybackLauncher::new("   ", None).is_err());
    }

    #[tokio::test]
    async fn missing_binary_fails_without_touching_history() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = LibraryStore::load(tmp.path().join("store.json"));
        let launcher = PlaybackLauncher::new("anidesk-no-such-binary", None).unwrap();
        let req =
            LaunchRequest::from_selection(&full_selection(), "best", Translation::Sub, Action::Play)
                .unwrap();

        let err = launcher.launch(&req, &mut store).unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
        assert!(store.history().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn only_play_launches_are_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = LibraryStore::load(tmp.path().join("store.json"));
        let launcher = PlaybackLauncher::new("true", Some("mpv")).unwrap();

        let download = LaunchRequest::from_selection(
            &full_selection(),
            "best",
            Translation::Sub,
            Action::Download,
        )
        .unwrap();
        launcher.launch(&download, &mut store).unwrap();
        assert!(store.history().is_empty());

        let play =
            LaunchRequest::from_selection(&full_selection(), "best", Translation::Sub, Action::Play)
                .unwrap();
        launcher.launch(&play, &mut store).unwrap();
        launcher.launch(&play, &mut store).unwrap();

        assert_eq!(store.history().len(), 1);
        let entry = &store.history().entries[0];
        assert_eq!(entry.title, "Example Show");
        assert_eq!((entry.query.as_str(), entry.index), ("Example", 3));
    }
}
