//! Interactive terminal session.
//!
//! One line of input at a time: free text becomes the current object and is
//! submitted at once, digits pick a suggestion, and `/commands` drive the
//! rest. The first line typed counts as the user gesture that unlocks speech.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::about;
use crate::error::{Rejected, VoiceError};
use crate::gemini::AnswerSource;
use crate::history::HistoryEntry;
use crate::service::{ClassificationService, Outcome, ServiceState};
use crate::state::Theme;

pub const SUGGESTIONS: [&str; 6] = [
    "Bouteille de shampoing",
    "Carton de pizza",
    "Canette de soda",
    "Bouteille en verre",
    "Sac plastique",
    "Pot de yaourt",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set the input and submit it.
    Text(String),
    /// Pick suggestion `n` (0-based) as the input.
    Suggestion(usize),
    Submit,
    UnlockVoice,
    Replay,
    ToggleDark,
    History,
    ClearHistory,
    About,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_line(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if let Ok(n) = line.parse::<usize>() {
        if (1..=SUGGESTIONS.len()).contains(&n) {
            return Command::Suggestion(n - 1);
        }
    }
    let Some(cmd) = line.strip_prefix('/') else {
        return Command::Text(line.to_string());
    };
    match cmd.to_lowercase().as_str() {
        "classer" | "c" => Command::Submit,
        "voix" | "v" => Command::UnlockVoice,
        "lire" | "l" => Command::Replay,
        "sombre" | "theme" => Command::ToggleDark,
        "historique" | "h" => Command::History,
        "effacer" => Command::ClearHistory,
        "apropos" => Command::About,
        "aide" | "?" => Command::Help,
        "quitter" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

const HELP: &str = "\
Tapez le nom d'un objet pour le classer, ou :
  1-6          choisir une suggestion
  /classer     classer l'objet courant
  /voix        activer la lecture vocale
  /lire        lire la dernière réponse à voix haute
  /sombre      basculer le mode sombre
  /historique  afficher l'historique récent
  /effacer     effacer l'historique
  /apropos     à propos du projet
  /quitter     quitter";

struct Palette {
    accent: &'static str,
    muted: &'static str,
    reset: &'static str,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Light => Palette {
            accent: "\x1b[34m",
            muted: "\x1b[90m",
            reset: "\x1b[0m",
        },
        Theme::Dark => Palette {
            accent: "\x1b[1;96m",
            muted: "\x1b[37m",
            reset: "\x1b[0m",
        },
    }
}

pub fn render_outcome(outcome: &Outcome, used: u32, quota: u32, theme: Theme) -> String {
    let p = palette(theme);
    let title = match outcome.state {
        ServiceState::Failed => "Erreur",
        _ => "Résultat IA",
    };
    let mut out = format!("{}{title} :{}\n{}\n", p.accent, p.reset, outcome.text);
    if let Some(bin) = outcome.bin {
        out.push_str(&format!(
            "{}Poubelle correspondante : {bin} ({}){}\n",
            p.muted,
            bin.image_path(),
            p.reset
        ));
    }
    if let Some(e) = outcome.voice_error {
        out.push_str(&format!("{e}\n"));
    }
    out.push_str(&format!(
        "{}Requêtes utilisées : {used} / {quota}{}",
        p.muted, p.reset
    ));
    out
}

pub fn render_history(entries: &[HistoryEntry], theme: Theme) -> String {
    if entries.is_empty() {
        return "Historique vide.".to_string();
    }
    let p = palette(theme);
    let mut lines = vec![format!("{}🕓 Historique récent{}", p.accent, p.reset)];
    lines.extend(
        entries
            .iter()
            .map(|e| format!("- {} → {}", e.object, e.result)),
    );
    lines.join("\n")
}

pub struct Console<A> {
    service: ClassificationService<A>,
    input: String,
    gesture_seen: bool,
}

impl<A: AnswerSource> Console<A> {
    pub fn new(service: ClassificationService<A>) -> Self {
        Self {
            service,
            input: String::new(),
            gesture_seen: false,
        }
    }

    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("Quel objet veux-tu jeter ? (/aide pour l'aide)");
        self.print_suggestions();

        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };

            if !self.handle_line(&line).await {
                break;
            }
        }

        if let Some(voice) = self.service.voice() {
            voice.cancel();
        }
        Ok(())
    }

    /// The first line is the gesture that unlocks speech, unless it already
    /// asks for speech or ends the session.
    async fn handle_line(&mut self, line: &str) -> bool {
        let command = parse_line(line);
        if !self.gesture_seen {
            self.gesture_seen = true;
            if !matches!(command, Command::UnlockVoice | Command::Quit) {
                if let Some(message) = self.unlock_voice(false).await {
                    println!("{message}");
                }
            }
        }
        self.handle(command).await
    }

    /// Returns `false` when the session should end.
    async fn handle(&mut self, command: Command) -> bool {
        debug!("Command: {command:?}");
        match command {
            Command::Text(text) => {
                self.input = text;
                self.submit().await;
            }
            Command::Suggestion(i) => {
                self.input = SUGGESTIONS[i].to_string();
                println!("Objet : {} (/classer pour lancer)", self.input);
            }
            Command::Submit => self.submit().await,
            Command::UnlockVoice => {
                if let Some(message) = self.unlock_voice(true).await {
                    println!("{message}");
                }
            }
            Command::Replay => match self.service.replay().await {
                Some(Ok(())) => {}
                Some(Err(e)) => println!("{e}"),
                None => println!("Rien à lire."),
            },
            Command::ToggleDark => {
                let theme = self.service.app().toggle_theme();
                println!("Mode {theme} activé.");
            }
            Command::History => {
                let app = self.service.app();
                println!("{}", render_history(app.history().all(), app.theme()));
            }
            Command::ClearHistory => {
                let mut app = self.service.app();
                if app.history().is_empty() {
                    println!("Historique déjà vide.");
                } else {
                    app.history_mut().clear();
                    println!("Historique effacé.");
                }
            }
            Command::About => println!("{}", about::ABOUT),
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
            Command::Empty => {}
            Command::Unknown(cmd) => println!("Commande inconnue : {cmd} (/aide)"),
        }
        true
    }

    async fn submit(&mut self) {
        if self.service.is_busy() {
            println!("{}", Rejected::Busy);
            return;
        }
        println!("Analyse en cours...");
        match self.service.submit(&self.input).await {
            Ok(outcome) => {
                let app = self.service.app();
                println!(
                    "{}",
                    render_outcome(
                        &outcome,
                        app.governor().count(),
                        app.governor().quota(),
                        app.theme()
                    )
                );
            }
            Err(rejected) => println!("{rejected}"),
        }
    }

    /// Message to show the user, if any.
    async fn unlock_voice(&self, explicit: bool) -> Option<String> {
        let Some(voice) = self.service.voice() else {
            return explicit.then(|| "Lecture vocale désactivée.".to_string());
        };
        match voice.unlock().await {
            Ok(true) => Some("✅ Lecture vocale activée.".to_string()),
            Ok(false) => explicit.then(|| "Lecture vocale déjà activée.".to_string()),
            Err(e @ VoiceError::NoVoiceAvailable) => Some(e.to_string()),
        }
    }

    fn print_suggestions(&self) {
        for (i, s) in SUGGESTIONS.iter().enumerate() {
            println!("  {}. {s}", i + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::classifier::BinCategory;
    use crate::config::{LimitsConfig, VoiceConfig};
    use crate::error::TransportError;
    use crate::state::AppState;
    use crate::store::{KeyValueStore, MemoryStore, DARK_MODE_KEY, HISTORY_KEY};
    use crate::voice::testing::RecordingBackend;
    use crate::voice::VoiceOutput;

    /// Answers every prompt with the same text.
    struct Fixed(&'static str);

    impl AnswerSource for Fixed {
        async fn ask(&self, _prompt: &str) -> Result<Option<String>, TransportError> {
            Ok(Some(self.0.to_string()))
        }
    }

    fn console(store: Arc<MemoryStore>, voice: Option<Arc<VoiceOutput>>) -> Console<Fixed> {
        let app = AppState::new(&LimitsConfig::default(), store);
        Console::new(ClassificationService::new(
            Fixed("Dans la poubelle jaune."),
            app,
            voice,
        ))
    }

    fn voice_output(backend: Arc<RecordingBackend>) -> Arc<VoiceOutput> {
        Arc::new(VoiceOutput::new(backend, &VoiceConfig::default()))
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line(""), Command::Empty);
        assert_eq!(parse_line("  "), Command::Empty);
        assert_eq!(parse_line("1"), Command::Suggestion(0));
        assert_eq!(parse_line("6"), Command::Suggestion(5));
        assert_eq!(parse_line("/classer"), Command::Submit);
        assert_eq!(parse_line("/VOIX"), Command::UnlockVoice);
        assert_eq!(parse_line("/lire"), Command::Replay);
        assert_eq!(parse_line("/sombre"), Command::ToggleDark);
        assert_eq!(parse_line("/effacer"), Command::ClearHistory);
        assert_eq!(parse_line("/quitter"), Command::Quit);
        assert_eq!(parse_line("/bof"), Command::Unknown("/bof".into()));
    }

    #[test]
    fn test_free_text_and_out_of_range_numbers() {
        assert_eq!(
            parse_line(" Bouteille de lait "),
            Command::Text("Bouteille de lait".into())
        );
        assert_eq!(parse_line("7"), Command::Text("7".into()));
        assert_eq!(parse_line("0"), Command::Text("0".into()));
    }

    #[test]
    fn test_render_outcome_with_bin() {
        let outcome = Outcome {
            state: ServiceState::Succeeded,
            text: "La poubelle verte.".into(),
            bin: Some(BinCategory::Green),
            voice_error: Some(VoiceError::NoVoiceAvailable),
        };
        let out = render_outcome(&outcome, 3, 30, Theme::Light);
        assert!(out.contains("Résultat IA"));
        assert!(out.contains("La poubelle verte."));
        assert!(out.contains("poubelle verte (/poubelle-verte.png)"));
        assert!(out.contains("Aucune voix disponible"));
        assert!(out.contains("Requêtes utilisées : 3 / 30"));
    }

    #[test]
    fn test_render_history() {
        assert_eq!(render_history(&[], Theme::Dark), "Historique vide.");
        let entries = vec![HistoryEntry::new("Sac plastique", "poubelle jaune")];
        let out = render_history(&entries, Theme::Dark);
        assert!(out.ends_with("- Sac plastique → poubelle jaune"));
    }

    #[tokio::test]
    async fn test_suggestion_then_submit_classifies_it() {
        let store = Arc::new(MemoryStore::new());
        let mut console = console(store.clone(), None);

        assert!(console.handle_line("3").await);
        assert_eq!(console.input, "Canette de soda");
        assert!(console.service.app().history().is_empty());

        assert!(console.handle_line("/classer").await);
        let app = console.service.app();
        assert_eq!(
            app.history().all(),
            &[HistoryEntry::new("Canette de soda", "Dans la poubelle jaune.")]
        );
        assert_eq!(app.governor().count(), 1);
    }

    #[tokio::test]
    async fn test_clear_history_drops_entries_and_key() {
        let store = Arc::new(MemoryStore::new());
        let mut console = console(store.clone(), None);

        assert!(console.handle_line("Sac plastique").await);
        assert!(store.get(HISTORY_KEY).is_some());

        assert!(console.handle_line("/effacer").await);
        assert!(console.service.app().history().is_empty());
        assert_eq!(store.get(HISTORY_KEY), None);
    }

    #[tokio::test]
    async fn test_dark_toggle_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut console = console(store.clone(), None);

        assert!(console.handle_line("/sombre").await);
        assert_eq!(console.service.app().theme(), Theme::Dark);
        assert_eq!(store.get(DARK_MODE_KEY).as_deref(), Some("true"));

        assert!(console.handle_line("/sombre").await);
        assert_eq!(console.service.app().theme(), Theme::Light);
        assert_eq!(store.get(DARK_MODE_KEY).as_deref(), Some("false"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_line_unlocks_voice_once() {
        let backend = Arc::new(RecordingBackend::french());
        let voice = voice_output(backend.clone());
        let mut console = console(Arc::new(MemoryStore::new()), Some(voice.clone()));

        assert!(console.handle_line("/aide").await);
        assert!(voice.is_unlocked());
        assert!(console.handle_line("/apropos").await);
        voice.flush().await;

        assert_eq!(backend.spoken(), vec!["Bienvenue sur ClassifIA !".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_command_as_first_line() {
        let backend = Arc::new(RecordingBackend::french());
        let voice = voice_output(backend.clone());
        let mut console = console(Arc::new(MemoryStore::new()), Some(voice.clone()));

        assert!(console.handle_line("/voix").await);
        assert!(voice.is_unlocked());
        voice.flush().await;
        assert_eq!(backend.spoken(), vec!["Bienvenue sur ClassifIA !".to_string()]);

        assert_eq!(
            console.unlock_voice(true).await.as_deref(),
            Some("Lecture vocale déjà activée.")
        );
        assert_eq!(console.unlock_voice(false).await, None);
    }

    #[tokio::test]
    async fn test_unlock_messages_without_voice_output() {
        let console = console(Arc::new(MemoryStore::new()), None);
        assert_eq!(
            console.unlock_voice(true).await.as_deref(),
            Some("Lecture vocale désactivée.")
        );
        assert_eq!(console.unlock_voice(false).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_as_first_line_skips_voice_lookup() {
        let backend = Arc::new(RecordingBackend::new(Vec::new()));
        let voice = voice_output(backend.clone());
        let mut console = console(Arc::new(MemoryStore::new()), Some(voice.clone()));

        let start = tokio::time::Instant::now();
        assert!(!console.handle_line("/quitter").await);
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(!voice.is_unlocked());
    }
}
