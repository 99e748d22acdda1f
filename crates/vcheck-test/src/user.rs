//! Scripted users - what the camera sees, frame by frame
//!
//! A script is a queue of actions. Each action lasts a fixed number of
//! frames; poses get a little random jitter so no two runs with different
//! seeds look the same. Once the script runs out the user holds still.

use std::collections::VecDeque;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use vcheck_liveness::AngleSample;

/// Neutral exposure reading
pub const NORMAL_BRIGHTNESS: f32 = 0.5;

/// Everything the collaborators report for one frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UserFrame {
    /// Head pose, `None` when the face is not visible
    pub pose: Option<AngleSample>,
    pub brightness: f32,
    pub faces: u32,
}

impl Default for UserFrame {
    fn default() -> Self {
        UserFrame {
            pose: Some(neutral()),
            brightness: NORMAL_BRIGHTNESS,
            faces: 1,
        }
    }
}

/// Straight ahead, mouth closed
pub fn neutral() -> AngleSample {
    AngleSample::new(0.0, 0.0, 0.0)
}

/// One step of a script
#[derive(Clone, Debug, PartialEq)]
pub enum UserAction {
    /// Keep a pose
    Hold { pose: AngleSample, frames: u32 },
    /// Move linearly from the current pose to `to`
    Move { to: AngleSample, frames: u32 },
    /// Step out of the frame
    Absent { frames: u32 },
    /// Keep the pose while the light drops
    Dark { brightness: f32, frames: u32 },
    /// Someone else steps into the frame
    Crowd { faces: u32, frames: u32 },
}

impl UserAction {
    pub fn frames(&self) -> u32 {
        match self {
            UserAction::Hold { frames, .. }
            | UserAction::Move { frames, .. }
            | UserAction::Absent { frames }
            | UserAction::Dark { frames, .. }
            | UserAction::Crowd { frames, .. } => *frames,
        }
    }
}

/// A user following a script in front of the camera
pub struct ScriptedUser {
    actions: VecDeque<UserAction>,
    /// Frames already spent on the front action
    step: u32,
    pose: AngleSample,
    jitter: Uniform<f32>,
    jitter_deg: f32,
    rng: StdRng,
    frames: u64,
}

impl ScriptedUser {
    /// An empty script; the user just looks at the camera
    pub fn new(seed: u64) -> Self {
        ScriptedUser {
            actions: VecDeque::new(),
            step: 0,
            pose: neutral(),
            jitter: Uniform::new_inclusive(-1.0, 1.0),
            jitter_deg: 0.0,
            rng: StdRng::seed_from_u64(seed),
            frames: 0,
        }
    }

    /// Add up to `degrees` of noise to every reported angle
    pub fn with_jitter(mut self, degrees: f32) -> Self {
        self.jitter_deg = degrees.abs();
        self
    }

    pub fn then(mut self, action: UserAction) -> Self {
        self.actions.push_back(action);
        self
    }

    pub fn hold(self, pose: AngleSample, frames: u32) -> Self {
        self.then(UserAction::Hold { pose, frames })
    }

    pub fn move_to(self, to: AngleSample, frames: u32) -> Self {
        self.then(UserAction::Move { to, frames })
    }

    /// Performs every gesture at a relaxed pace, about two and a half seconds
    pub fn cooperative(seed: u64) -> Self {
        ScriptedUser::new(seed)
            .with_jitter(1.5)
            .hold(neutral(), 10)
            .move_to(AngleSample::new(0.0, 25.0, 0.0), 8)
            .hold(AngleSample::new(0.0, 25.0, 0.0), 4)
            .move_to(neutral(), 6)
            .move_to(AngleSample::new(-28.0, 0.0, 0.0), 8)
            .hold(AngleSample::new(-28.0, 0.0, 0.0), 4)
            .move_to(AngleSample::new(28.0, 0.0, 0.0), 12)
            .hold(AngleSample::new(28.0, 0.0, 0.0), 4)
            .move_to(neutral(), 6)
            .move_to(AngleSample::new(0.0, 0.0, 0.9), 5)
            .hold(AngleSample::new(0.0, 0.0, 0.9), 10)
            .hold(neutral(), 30)
    }

    /// Looks at the camera while the room is too dark
    pub fn in_the_dark(seed: u64) -> Self {
        ScriptedUser::new(seed).with_jitter(1.0).then(UserAction::Dark {
            brightness: -3.0,
            frames: 120,
        })
    }

    /// Someone joins after a few frames
    pub fn with_company(seed: u64) -> Self {
        ScriptedUser::new(seed)
            .with_jitter(1.0)
            .hold(neutral(), 5)
            .then(UserAction::Crowd { faces: 2, frames: 120 })
    }

    /// Walks out of the frame
    pub fn walks_away(seed: u64) -> Self {
        ScriptedUser::new(seed)
            .hold(neutral(), 3)
            .then(UserAction::Absent { frames: 120 })
    }

    /// Turns the head far past the yaw limit, then waits
    pub fn over_rotates(seed: u64) -> Self {
        ScriptedUser::new(seed)
            .with_jitter(2.0)
            .move_to(AngleSample::new(0.0, 70.0, 0.0), 6)
            .hold(AngleSample::new(0.0, 70.0, 0.0), 90)
            .move_to(neutral(), 6)
    }

    /// Never moves
    pub fn idle(seed: u64) -> Self {
        ScriptedUser::new(seed).with_jitter(1.0)
    }

    pub fn frames_played(&self) -> u64 {
        self.frames
    }

    pub fn is_script_done(&self) -> bool {
        self.actions.is_empty()
    }

    /// Produce the next frame
    pub fn next_frame(&mut self) -> UserFrame {
        self.frames += 1;

        while let Some(action) = self.actions.front() {
            if self.step < action.frames() {
                break;
            }
            self.actions.pop_front();
            self.step = 0;
        }

        let Some(action) = self.actions.front().cloned() else {
            return self.visible(1, NORMAL_BRIGHTNESS);
        };
        self.step += 1;

        match action {
            UserAction::Hold { pose, .. } => {
                self.pose = pose;
                self.visible(1, NORMAL_BRIGHTNESS)
            }
            UserAction::Move { to, frames } => {
                let remaining = (frames - self.step + 1) as f32;
                self.pose = AngleSample::new(
                    self.pose.pitch + (to.pitch - self.pose.pitch) / remaining,
                    self.pose.yaw + (to.yaw - self.pose.yaw) / remaining,
                    self.pose.mouth_factor + (to.mouth_factor - self.pose.mouth_factor) / remaining,
                );
                self.visible(1, NORMAL_BRIGHTNESS)
            }
            UserAction::Absent { .. } => UserFrame {
                pose: None,
                brightness: NORMAL_BRIGHTNESS,
                faces: 0,
            },
            UserAction::Dark { brightness, .. } => self.visible(1, brightness),
            UserAction::Crowd { faces, .. } => self.visible(faces, NORMAL_BRIGHTNESS),
        }
    }

    fn visible(&mut self, faces: u32, brightness: f32) -> UserFrame {
        let pose = if self.jitter_deg > 0.0 {
            let pitch = self.jitter.sample(&mut self.rng) * self.jitter_deg;
            let yaw = self.jitter.sample(&mut self.rng) * self.jitter_deg;
            AngleSample::new(self.pose.pitch + pitch, self.pose.yaw + yaw, self.pose.mouth_factor)
        } else {
            self.pose
        };
        UserFrame {
            pose: Some(pose),
            brightness,
            faces,
        }
    }
}

impl Iterator for ScriptedUser {
    type Item = UserFrame;

    fn next(&mut self) -> Option<UserFrame> {
        Some(self.next_frame())
    }
}
