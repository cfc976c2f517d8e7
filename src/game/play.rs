//! Running a game live in front of a class.
//!
//! A play run moves through `Board → Question → TeamSelect → Board` until
//! every question has been answered, at which point it is `Complete`.
//! Scores are kept per team. The host may also skip a question, return to
//! the board without answering, or correct a team's score by hand.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::models::{Difficulty, GameContent, Media};

pub const MAX_TEAMS: usize = 8;
pub const MAX_TEAM_NAME_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayError {
    #[error("{0}")]
    InvalidTeams(String),
    #[error("There is no question at category {category}, row {question}")]
    UnknownCell { category: usize, question: usize },
    #[error("That question has already been played")]
    AlreadyAnswered,
    #[error("Pick a question from the board first")]
    NotOnBoard,
    #[error("No question is open")]
    NoOpenQuestion,
    #[error("Points can only be awarded after choosing a team")]
    NotSelectingTeam,
    #[error("Team {0} does not exist")]
    UnknownTeam(usize),
    #[error("The game is already complete")]
    GameComplete,
    #[error("That score change is too large")]
    ScoreOutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    pub name: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Board,
    Question {
        category: usize,
        question: usize,
        answer_revealed: bool,
        opened_at: Instant,
    },
    TeamSelect {
        category: usize,
        question: usize,
    },
    Complete,
}

/// Host actions, shared by the REST endpoints and the WebSocket channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlayCommand {
    Select { category: usize, question: usize },
    Reveal,
    TeamSelect,
    Award { team: Option<usize> },
    Skip,
    Back,
    Adjust { team: usize, delta: i64 },
}

#[derive(Debug, Clone)]
pub struct PlayState {
    content: GameContent,
    teams: Vec<Team>,
    answered: Vec<Vec<bool>>,
    phase: Phase,
    /// Bumped on every accepted command so viewers can drop stale snapshots
    version: u64,
}

impl PlayState {
    /// Start a run with the given team names, on the board
    pub fn start(content: GameContent, team_names: Vec<String>) -> Result<Self, PlayError> {
        let teams = validate_teams(team_names)?;
        let answered = content
            .categories
            .iter()
            .map(|c| vec![false; c.questions.len()])
            .collect();

        let phase = if content.question_count() == 0 {
            Phase::Complete
        } else {
            Phase::Board
        };

        Ok(Self {
            content,
            teams,
            answered,
            phase,
            version: 0,
        })
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::Complete)
    }

    pub fn remaining_questions(&self) -> usize {
        self.answered
            .iter()
            .flatten()
            .filter(|answered| !**answered)
            .count()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn apply(&mut self, command: PlayCommand, now: Instant) -> Result<(), PlayError> {
        let result = match command {
            PlayCommand::Select { category, question } => {
                self.select_question(category, question, now)
            }
            PlayCommand::Reveal => self.reveal_answer(),
            PlayCommand::TeamSelect => self.to_team_select(),
            PlayCommand::Award { team } => self.award(team),
            PlayCommand::Skip => self.skip(),
            PlayCommand::Back => self.back_to_board(),
            PlayCommand::Adjust { team, delta } => self.adjust_score(team, delta),
        };
        if result.is_ok() {
            self.version += 1;
        }
        result
    }

    pub fn select_question(
        &mut self,
        category: usize,
        question: usize,
        now: Instant,
    ) -> Result<(), PlayError> {
        match self.phase {
            Phase::Board => {}
            Phase::Complete => return Err(PlayError::GameComplete),
            _ => return Err(PlayError::NotOnBoard),
        }

        let answered = self
            .answered
            .get(category)
            .and_then(|row| row.get(question))
            .ok_or(PlayError::UnknownCell { category, question })?;
        if *answered {
            return Err(PlayError::AlreadyAnswered);
        }

        self.phase = Phase::Question {
            category,
            question,
            answer_revealed: false,
            opened_at: now,
        };
        Ok(())
    }

    pub fn reveal_answer(&mut self) -> Result<(), PlayError> {
        match &mut self.phase {
            Phase::Question {
                answer_revealed, ..
            } => {
                *answer_revealed = true;
                Ok(())
            }
            Phase::Complete => Err(PlayError::GameComplete),
            _ => Err(PlayError::NoOpenQuestion),
        }
    }

    pub fn to_team_select(&mut self) -> Result<(), PlayError> {
        match self.phase {
            Phase::Question {
                category, question, ..
            } => {
                self.phase = Phase::TeamSelect { category, question };
                Ok(())
            }
            Phase::Complete => Err(PlayError::GameComplete),
            _ => Err(PlayError::NoOpenQuestion),
        }
    }

    /// Give the open question's value to a team, or to nobody
    pub fn award(&mut self, team: Option<usize>) -> Result<(), PlayError> {
        let (category, question) = match self.phase {
            Phase::TeamSelect { category, question } => (category, question),
            Phase::Complete => return Err(PlayError::GameComplete),
            _ => return Err(PlayError::NotSelectingTeam),
        };

        if let Some(idx) = team {
            let value = self
                .content
                .question(category, question)
                .map(|q| q.value as i64)
                .unwrap_or(0);
            let team = self.teams.get_mut(idx).ok_or(PlayError::UnknownTeam(idx))?;
            team.score = team
                .score
                .checked_add(value)
                .ok_or(PlayError::ScoreOutOfRange)?;
        }

        self.finish_question(category, question);
        Ok(())
    }

    /// Close the open question without awarding points
    pub fn skip(&mut self) -> Result<(), PlayError> {
        let (category, question) = match self.phase {
            Phase::Question {
                category, question, ..
            }
            | Phase::TeamSelect { category, question } => (category, question),
            Phase::Complete => return Err(PlayError::GameComplete),
            Phase::Board => return Err(PlayError::NoOpenQuestion),
        };
        self.finish_question(category, question);
        Ok(())
    }

    /// Return to the board leaving the question playable
    pub fn back_to_board(&mut self) -> Result<(), PlayError> {
        match self.phase {
            Phase::Question { .. } => {
                self.phase = Phase::Board;
                Ok(())
            }
            Phase::Complete => Err(PlayError::GameComplete),
            _ => Err(PlayError::NoOpenQuestion),
        }
    }

    pub fn adjust_score(&mut self, team: usize, delta: i64) -> Result<(), PlayError> {
        if self.is_complete() {
            return Err(PlayError::GameComplete);
        }
        let team = self.teams.get_mut(team).ok_or(PlayError::UnknownTeam(team))?;
        team.score = team
            .score
            .checked_add(delta)
            .ok_or(PlayError::ScoreOutOfRange)?;
        Ok(())
    }

    fn finish_question(&mut self, category: usize, question: usize) {
        if let Some(cell) = self
            .answered
            .get_mut(category)
            .and_then(|row| row.get_mut(question))
        {
            *cell = true;
        }

        self.phase = if self.remaining_questions() == 0 {
            Phase::Complete
        } else {
            Phase::Board
        };
    }

    pub fn snapshot(&self, now: Instant) -> PlaySnapshot {
        let board = self
            .content
            .categories
            .iter()
            .zip(&self.answered)
            .map(|(category, answered)| CategoryView {
                name: category.name.clone(),
                cells: category
                    .questions
                    .iter()
                    .zip(answered)
                    .map(|(q, answered)| CellView {
                        value: q.value,
                        answered: *answered,
                    })
                    .collect(),
            })
            .collect();

        let phase = match &self.phase {
            Phase::Board => PhaseView::Board,
            Phase::Question {
                category,
                question,
                answer_revealed,
                opened_at,
            } => {
                let q = self.content.question(*category, *question);
                let time_remaining = q.and_then(|q| q.timer_seconds).map(|seconds| {
                    Duration::from_secs(seconds as u64)
                        .saturating_sub(now.saturating_duration_since(*opened_at))
                        .as_secs()
                });
                PhaseView::Question {
                    category: *category,
                    question: *question,
                    value: q.map(|q| q.value).unwrap_or(0),
                    text: q.map(|q| q.text.clone()).unwrap_or_default(),
                    answer: if *answer_revealed {
                        q.map(|q| q.answer.clone())
                    } else {
                        None
                    },
                    media: q.and_then(|q| q.media.clone()),
                    difficulty: q.and_then(|q| q.difficulty),
                    time_remaining,
                    timer_expired: time_remaining == Some(0),
                }
            }
            Phase::TeamSelect { category, question } => {
                let q = self.content.question(*category, *question);
                PhaseView::TeamSelect {
                    category: *category,
                    question: *question,
                    value: q.map(|q| q.value).unwrap_or(0),
                    answer: q.map(|q| q.answer.clone()).unwrap_or_default(),
                }
            }
            Phase::Complete => PhaseView::Complete,
        };

        PlaySnapshot {
            version: self.version,
            phase,
            board,
            teams: self.teams.clone(),
            remaining_questions: self.remaining_questions(),
            standings: self.is_complete().then(|| self.standings()),
        }
    }

    /// Final ranking, highest score first; ties share the win
    pub fn standings(&self) -> Standings {
        let mut ranking = self.teams.clone();
        ranking.sort_by(|a, b| b.score.cmp(&a.score));

        let winners = match ranking.first() {
            Some(top) => ranking
                .iter()
                .filter(|t| t.score == top.score)
                .map(|t| t.name.clone())
                .collect(),
            None => Vec::new(),
        };

        Standings { winners, ranking }
    }
}

fn validate_teams(team_names: Vec<String>) -> Result<Vec<Team>, PlayError> {
    if team_names.is_empty() {
        return Err(PlayError::InvalidTeams("Add at least one team".to_string()));
    }
    if team_names.len() > MAX_TEAMS {
        return Err(PlayError::InvalidTeams(format!(
            "At most {} teams can play",
            MAX_TEAMS
        )));
    }

    let mut seen = HashSet::new();
    let mut teams = Vec::with_capacity(team_names.len());
    for name in team_names {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(PlayError::InvalidTeams("Team names cannot be empty".to_string()));
        }
        if name.chars().count() > MAX_TEAM_NAME_LEN {
            return Err(PlayError::InvalidTeams(format!(
                "Team names must be at most {} characters",
                MAX_TEAM_NAME_LEN
            )));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(PlayError::InvalidTeams(format!(
                "Team name '{}' is used twice",
                name
            )));
        }
        teams.push(Team { name, score: 0 });
    }
    Ok(teams)
}

#[derive(Debug, Clone, Serialize)]
pub struct CellView {
    pub value: i32,
    pub answered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryView {
    pub name: String,
    pub cells: Vec<CellView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PhaseView {
    Board,
    Question {
        category: usize,
        question: usize,
        value: i32,
        text: String,
        /// Hidden until the host reveals it
        answer: Option<String>,
        media: Option<Media>,
        difficulty: Option<Difficulty>,
        time_remaining: Option<u64>,
        timer_expired: bool,
    },
    TeamSelect {
        category: usize,
        question: usize,
        value: i32,
        answer: String,
    },
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct Standings {
    pub winners: Vec<String>,
    pub ranking: Vec<Team>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaySnapshot {
    pub version: u64,
    #[serde(flatten)]
    pub phase: PhaseView,
    pub board: Vec<CategoryView>,
    pub teams: Vec<Team>,
    pub remaining_questions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standings: Option<Standings>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Question};

    fn question(value: i32, timer_seconds: Option<u32>) -> Question {
        Question {
            value,
            text: format!("Question worth {}", value),
            answer: format!("Answer {}", value),
            media: None,
            timer_seconds,
            difficulty: None,
        }
    }

    /// Two categories: the first with 100 and 200, the second with 300
    fn small_board() -> GameContent {
        GameContent {
            categories: vec![
                Category {
                    name: "Science".to_string(),
                    questions: vec![question(100, None), question(200, Some(30))],
                },
                Category {
                    name: "History".to_string(),
                    questions: vec![question(300, None)],
                },
            ],
        }
    }

    fn teams() -> Vec<String> {
        vec!["Red".to_string(), "Blue".to_string()]
    }

    fn play_cell(state: &mut PlayState, category: usize, question: usize, team: Option<usize>) {
        let now = Instant::now();
        state.select_question(category, question, now).unwrap();
        state.reveal_answer().unwrap();
        state.to_team_select().unwrap();
        state.award(team).unwrap();
    }

    #[test]
    fn test_starts_on_board_with_zero_scores() {
        let state = PlayState::start(small_board(), teams()).unwrap();
        assert_eq!(state.phase(), &Phase::Board);
        assert_eq!(state.remaining_questions(), 3);
        assert!(state.teams().iter().all(|t| t.score == 0));
    }

    #[test]
    fn test_team_validation() {
        assert!(matches!(
            PlayState::start(small_board(), Vec::new()),
            Err(PlayError::InvalidTeams(_))
        ));
        assert!(matches!(
            PlayState::start(small_board(), vec!["Red".to_string(), "red ".to_string()]),
            Err(PlayError::InvalidTeams(_))
        ));
        assert!(matches!(
            PlayState::start(small_board(), vec!["  ".to_string()]),
            Err(PlayError::InvalidTeams(_))
        ));
        let nine = (1..=9).map(|i| format!("Team {}", i)).collect();
        assert!(matches!(
            PlayState::start(small_board(), nine),
            Err(PlayError::InvalidTeams(_))
        ));
    }

    #[test]
    fn test_full_cycle_awards_points_and_returns_to_board() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        play_cell(&mut state, 0, 1, Some(1));

        assert_eq!(state.phase(), &Phase::Board);
        assert_eq!(state.teams()[1].score, 200);
        assert_eq!(state.teams()[0].score, 0);
        assert_eq!(state.remaining_questions(), 2);
    }

    #[test]
    fn test_all_questions_answered_completes_game() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        play_cell(&mut state, 0, 0, Some(0));
        play_cell(&mut state, 0, 1, Some(1));
        play_cell(&mut state, 1, 0, None);

        assert!(state.is_complete());
        let snapshot = state.snapshot(Instant::now());
        assert!(matches!(snapshot.phase, PhaseView::Complete));
        let standings = snapshot.standings.unwrap();
        assert_eq!(standings.winners, vec!["Blue".to_string()]);
        assert_eq!(standings.ranking[0].score, 200);
    }

    #[test]
    fn test_empty_board_is_complete_immediately() {
        let content = GameContent {
            categories: vec![Category {
                name: "Empty".to_string(),
                questions: Vec::new(),
            }],
        };
        let state = PlayState::start(content, teams()).unwrap();
        assert!(state.is_complete());
    }

    #[test]
    fn test_cannot_select_answered_or_missing_cell() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        play_cell(&mut state, 0, 0, Some(0));

        assert_eq!(
            state.select_question(0, 0, Instant::now()),
            Err(PlayError::AlreadyAnswered)
        );
        assert_eq!(
            state.select_question(1, 1, Instant::now()),
            Err(PlayError::UnknownCell {
                category: 1,
                question: 1
            })
        );
    }

    #[test]
    fn test_illegal_transitions() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        assert_eq!(state.reveal_answer(), Err(PlayError::NoOpenQuestion));
        assert_eq!(state.to_team_select(), Err(PlayError::NoOpenQuestion));
        assert_eq!(state.award(Some(0)), Err(PlayError::NotSelectingTeam));
        assert_eq!(state.skip(), Err(PlayError::NoOpenQuestion));

        state.select_question(0, 0, Instant::now()).unwrap();
        assert_eq!(
            state.select_question(0, 1, Instant::now()),
            Err(PlayError::NotOnBoard)
        );
        assert_eq!(state.award(Some(0)), Err(PlayError::NotSelectingTeam));
    }

    #[test]
    fn test_award_to_unknown_team_keeps_question_open() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        state.select_question(0, 0, Instant::now()).unwrap();
        state.to_team_select().unwrap();

        assert_eq!(state.award(Some(5)), Err(PlayError::UnknownTeam(5)));
        assert!(matches!(state.phase(), Phase::TeamSelect { .. }));
        assert_eq!(state.remaining_questions(), 3);
    }

    #[test]
    fn test_skip_marks_answered_without_points() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        state.select_question(1, 0, Instant::now()).unwrap();
        state.skip().unwrap();

        assert_eq!(state.phase(), &Phase::Board);
        assert_eq!(state.remaining_questions(), 2);
        assert!(state.teams().iter().all(|t| t.score == 0));
    }

    #[test]
    fn test_back_to_board_leaves_question_playable() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        state.select_question(0, 0, Instant::now()).unwrap();
        state.back_to_board().unwrap();

        assert_eq!(state.remaining_questions(), 3);
        assert!(state.select_question(0, 0, Instant::now()).is_ok());
    }

    #[test]
    fn test_adjust_score_and_complete_rejects_commands() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        state.adjust_score(0, -50).unwrap();
        assert_eq!(state.teams()[0].score, -50);
        assert_eq!(state.adjust_score(7, 10), Err(PlayError::UnknownTeam(7)));

        play_cell(&mut state, 0, 0, None);
        play_cell(&mut state, 0, 1, None);
        play_cell(&mut state, 1, 0, None);
        assert_eq!(state.adjust_score(0, 10), Err(PlayError::GameComplete));
        assert_eq!(
            state.select_question(0, 0, Instant::now()),
            Err(PlayError::GameComplete)
        );
    }

    #[test]
    fn test_adjust_score_overflow_is_rejected() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        state.adjust_score(0, i64::MAX).unwrap();

        assert_eq!(state.adjust_score(0, 1), Err(PlayError::ScoreOutOfRange));
        assert_eq!(state.teams()[0].score, i64::MAX);

        state.adjust_score(1, i64::MIN).unwrap();
        assert_eq!(state.adjust_score(1, -1), Err(PlayError::ScoreOutOfRange));
    }

    #[test]
    fn test_award_overflow_keeps_question_open() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        state.adjust_score(0, i64::MAX).unwrap();
        state.select_question(0, 0, Instant::now()).unwrap();
        state.to_team_select().unwrap();

        assert_eq!(state.award(Some(0)), Err(PlayError::ScoreOutOfRange));
        assert!(matches!(state.phase(), Phase::TeamSelect { .. }));
        assert_eq!(state.remaining_questions(), 3);
    }

    #[test]
    fn test_version_counts_accepted_commands_only() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        let now = Instant::now();
        assert_eq!(state.snapshot(now).version, 0);

        state
            .apply(PlayCommand::Select { category: 0, question: 0 }, now)
            .unwrap();
        assert!(state.apply(PlayCommand::Award { team: Some(0) }, now).is_err());
        state.apply(PlayCommand::Reveal, now).unwrap();

        assert_eq!(state.version(), 2);
        let json = serde_json::to_value(state.snapshot(now)).unwrap();
        assert_eq!(json["version"], 2);
    }

    #[test]
    fn test_answer_hidden_until_revealed() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        let now = Instant::now();
        state.select_question(0, 0, now).unwrap();

        match state.snapshot(now).phase {
            PhaseView::Question { answer, .. } => assert!(answer.is_none()),
            other => panic!("unexpected phase {:?}", other),
        }

        state.reveal_answer().unwrap();
        match state.snapshot(now).phase {
            PhaseView::Question { answer, .. } => assert_eq!(answer.as_deref(), Some("Answer 100")),
            other => panic!("unexpected phase {:?}", other),
        }
    }

    #[test]
    fn test_timer_counts_down_and_expires() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        let opened = Instant::now();
        state.select_question(0, 1, opened).unwrap();

        match state.snapshot(opened + Duration::from_secs(10)).phase {
            PhaseView::Question {
                time_remaining,
                timer_expired,
                ..
            } => {
                assert_eq!(time_remaining, Some(20));
                assert!(!timer_expired);
            }
            other => panic!("unexpected phase {:?}", other),
        }

        match state.snapshot(opened + Duration::from_secs(45)).phase {
            PhaseView::Question {
                time_remaining,
                timer_expired,
                ..
            } => {
                assert_eq!(time_remaining, Some(0));
                assert!(timer_expired);
            }
            other => panic!("unexpected phase {:?}", other),
        }
    }

    #[test]
    fn test_tied_winners() {
        let mut state = PlayState::start(small_board(), teams()).unwrap();
        play_cell(&mut state, 0, 0, Some(0));
        play_cell(&mut state, 0, 1, None);
        state.adjust_score(1, 100).unwrap();
        play_cell(&mut state, 1, 0, None);

        let standings = state.standings();
        assert_eq!(standings.winners, vec!["Red".to_string(), "Blue".to_string()]);
    }

    #[test]
    fn test_command_deserialization() {
        let cmd: PlayCommand =
            serde_json::from_str(r#"{"action": "select", "category": 1, "question": 2}"#).unwrap();
        assert_eq!(
            cmd,
            PlayCommand::Select {
                category: 1,
                question: 2
            }
        );

        let cmd: PlayCommand = serde_json::from_str(r#"{"action": "award", "team": null}"#).unwrap();
        assert_eq!(cmd, PlayCommand::Award { team: None });
    }

    #[test]
    fn test_snapshot_serializes_state_tag() {
        let state = PlayState::start(small_board(), teams()).unwrap();
        let json = serde_json::to_value(state.snapshot(Instant::now())).unwrap();

        assert_eq!(json["state"], "board");
        assert_eq!(json["board"][0]["cells"][1]["value"], 200);
        assert_eq!(json["remaining_questions"], 3);
        assert!(json.get("standings").is_none());
    }
}
