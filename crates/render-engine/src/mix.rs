//! Mix graph compilation and encode argument assembly.
//!
//! Track chains are folded left to right: each adjacent pair is joined by
//! a crossfade when the transition has a duration, or by a plain join
//! when it does not. The last fold is labelled [`FINAL_LABEL`].

use std::path::{Path, PathBuf};

use mixdown_common::config::{AudioFormat, ExportDefaults, DEFAULT_BITRATE_KBPS};
use mixdown_common::error::{MixError, MixResult};
use mixdown_project_model::project::{LoadedMix, MixMetadata, Transition};
use mixdown_project_model::track::CrossfadeCurve;

use crate::chain::{compile_track_chain, concat, ChainOptions, TrackChain};
use crate::graph::{num, Filter, FilterGraph, FilterStage, Pad};
use crate::loudness::LoudnessTargets;
use crate::progress::total_mix_duration;

/// Label of the graph's single output.
pub const FINAL_LABEL: &str = "out";

/// Compiled chains plus the transition stages that join them.
#[derive(Debug, Clone)]
pub struct MixGraph {
    pub chains: Vec<TrackChain>,
    pub transitions: Vec<FilterStage>,
    pub output: Pad,
}

impl MixGraph {
    /// Flatten into stage order: every chain, then every transition.
    pub fn to_filter_graph(&self) -> FilterGraph {
        let mut graph = FilterGraph::new();
        for chain in &self.chains {
            for stage in &chain.stages {
                graph.push(stage.clone());
            }
        }
        for stage in &self.transitions {
            graph.push(stage.clone());
        }
        graph
    }

    pub fn to_filter_complex(&self) -> String {
        self.to_filter_graph().to_filter_complex()
    }
}

/// Engine curve names for the fade-out and fade-in sides of a crossfade.
pub fn crossfade_curves(curve: CrossfadeCurve) -> (&'static str, &'static str) {
    match curve {
        CrossfadeCurve::EqualPower => ("qsin", "qsin"),
        CrossfadeCurve::SCurve => ("hsin", "hsin"),
        CrossfadeCurve::Linear | CrossfadeCurve::Unknown => ("tri", "tri"),
    }
}

fn transition_filter(transition: &Transition) -> Filter {
    if transition.duration_secs > 0.0 {
        let (c1, c2) = crossfade_curves(transition.curve);
        Filter::new("acrossfade")
            .arg("d", num(transition.duration_secs))
            .arg("c1", c1)
            .arg("c2", c2)
    } else {
        concat(2)
    }
}

/// Join track chains into one graph with a single [`FINAL_LABEL`] output.
///
/// Expects exactly one transition per adjacent pair of chains.
pub fn compile_mix_graph(
    mut chains: Vec<TrackChain>,
    transitions: &[Transition],
) -> MixResult<MixGraph> {
    if chains.is_empty() {
        return Err(MixError::graph_build("cannot build a mix with zero tracks"));
    }
    if transitions.len() != chains.len() - 1 {
        return Err(MixError::graph_build(format!(
            "{} tracks need {} transitions, got {}",
            chains.len(),
            chains.len() - 1,
            transitions.len()
        )));
    }

    let final_pad = Pad::new(FINAL_LABEL);
    let mut stages = Vec::with_capacity(transitions.len());

    if let [only] = chains.as_mut_slice() {
        only.relabel_output(final_pad.clone());
    } else {
        let mut carried = chains[0].output.clone();
        for (i, transition) in transitions.iter().enumerate() {
            let folded = if i + 1 == transitions.len() {
                final_pad.clone()
            } else {
                Pad::new(format!("x{}", i + 1))
            };
            stages.push(FilterStage::new(
                vec![carried, chains[i + 1].output.clone()],
                vec![transition_filter(transition)],
                vec![folded.clone()],
            ));
            carried = folded;
        }
    }

    let mix = MixGraph {
        chains,
        transitions: stages,
        output: final_pad,
    };

    let dangling = mix.to_filter_graph().validate(mix.chains.len())?;
    if dangling != mix.output {
        return Err(MixError::graph_build(format!(
            "graph ends at {dangling}, expected {}",
            mix.output
        )));
    }
    Ok(mix)
}

/// Codec options for the requested output format.
pub fn codec_args(format: AudioFormat, bitrate_kbps: u32) -> Vec<String> {
    match format {
        AudioFormat::Wav => vec!["-c:a".into(), "pcm_s16le".into()],
        AudioFormat::Flac => vec![
            "-c:a".into(),
            "flac".into(),
            "-compression_level".into(),
            "12".into(),
        ],
        AudioFormat::Mp3 => {
            let kbps = if bitrate_kbps == 0 {
                DEFAULT_BITRATE_KBPS
            } else {
                bitrate_kbps
            };
            vec![
                "-c:a".into(),
                "libmp3lame".into(),
                "-b:a".into(),
                format!("{kbps}k"),
            ]
        }
    }
}

/// Full engine argument list; the destination path is always last.
pub fn build_encode_args(
    inputs: &[PathBuf],
    filter_complex: &str,
    format: AudioFormat,
    bitrate_kbps: u32,
    metadata: &MixMetadata,
    output: &Path,
) -> Vec<String> {
    let mut args = vec!["-hide_banner".to_string()];
    for input in inputs {
        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());
    }
    args.push("-filter_complex".to_string());
    args.push(filter_complex.to_string());
    args.push("-map".to_string());
    args.push(format!("[{FINAL_LABEL}]"));
    args.extend(codec_args(format, bitrate_kbps));
    for (key, value) in metadata.entries() {
        args.push("-metadata".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push("-y".to_string());
    args.push(output.to_string_lossy().to_string());
    args
}

/// Everything needed to run the encode.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub args: Vec<String>,
    pub graph: MixGraph,
    /// Estimated output length, used for progress.
    pub total_duration_secs: f64,
}

/// Compile a loaded mix into an encode invocation writing to `output`.
///
/// Loudness measurements must already be on the tracks when normalization
/// is requested; tracks without one pass through unchanged.
pub fn plan_render(
    mix: &LoadedMix,
    settings: &ExportDefaults,
    output: &Path,
) -> MixResult<RenderPlan> {
    let project = &mix.project;
    let transitions = project.transitions(settings.default_crossfade_secs);
    let options = ChainOptions {
        normalize: settings.normalize,
        targets: LoudnessTargets::default(),
    };

    let chains = project
        .tracks
        .iter()
        .enumerate()
        .map(|(index, track)| compile_track_chain(index, track, &options))
        .collect();
    let graph = compile_mix_graph(chains, &transitions)?;

    let args = build_encode_args(
        &mix.source_paths(),
        &graph.to_filter_complex(),
        settings.format,
        settings.bitrate_kbps,
        &project.effective_metadata(),
        output,
    );

    tracing::debug!(
        tracks = project.tracks.len(),
        stages = graph.to_filter_graph().stages.len(),
        "Compiled mix graph"
    );

    Ok(RenderPlan {
        args,
        total_duration_secs: total_mix_duration(&project.tracks, &transitions),
        graph,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_project_model::project::MixProject;
    use mixdown_project_model::track::Track;
    use proptest::prelude::*;

    fn chains(n: usize) -> Vec<TrackChain> {
        (0..n)
            .map(|i| {
                let track = Track::new(i as u32, format!("T{i}"), format!("{i}.wav"), 120.0);
                compile_track_chain(i, &track, &ChainOptions::default())
            })
            .collect()
    }

    fn fade(duration_secs: f64, curve: CrossfadeCurve) -> Transition {
        Transition {
            duration_secs,
            curve,
        }
    }

    #[test]
    fn test_single_track_relabels_to_final() {
        let mix = compile_mix_graph(chains(1), &[]).unwrap();
        assert!(mix.transitions.is_empty());
        assert_eq!(mix.output, Pad::new("out"));
        assert!(mix.to_filter_complex().ends_with("[t0_cut]anull[out]"));
    }

    #[test]
    fn test_zero_tracks_rejected() {
        let err = compile_mix_graph(vec![], &[]).unwrap_err();
        assert!(matches!(err, MixError::GraphBuild { .. }));
    }

    #[test]
    fn test_transition_count_checked() {
        let err = compile_mix_graph(chains(3), &[fade(2.0, CrossfadeCurve::Linear)]).unwrap_err();
        assert!(matches!(err, MixError::GraphBuild { .. }));
    }

    #[test]
    fn test_crossfade_and_join_fold() {
        let mix = compile_mix_graph(
            chains(3),
            &[
                fade(5.0, CrossfadeCurve::EqualPower),
                fade(0.0, CrossfadeCurve::SCurve),
            ],
        )
        .unwrap();

        let first = &mix.transitions[0];
        assert_eq!(first.inputs, vec![Pad::new("a0"), Pad::new("a1")]);
        assert_eq!(
            first.filters[0].to_string(),
            "acrossfade=d=5.000000:c1=qsin:c2=qsin"
        );
        assert_eq!(first.outputs, vec![Pad::new("x1")]);

        let second = &mix.transitions[1];
        assert_eq!(second.inputs, vec![Pad::new("x1"), Pad::new("a2")]);
        assert_eq!(second.filters[0].to_string(), "concat=n=2:v=0:a=1");
        assert_eq!(second.outputs, vec![Pad::new("out")]);
    }

    #[test]
    fn test_curve_parameters() {
        assert_eq!(crossfade_curves(CrossfadeCurve::Linear), ("tri", "tri"));
        assert_eq!(crossfade_curves(CrossfadeCurve::EqualPower), ("qsin", "qsin"));
        assert_eq!(crossfade_curves(CrossfadeCurve::SCurve), ("hsin", "hsin"));
        assert_eq!(crossfade_curves(CrossfadeCurve::Unknown), ("tri", "tri"));
    }

    #[test]
    fn test_codec_args() {
        assert_eq!(codec_args(AudioFormat::Wav, 0), vec!["-c:a", "pcm_s16le"]);
        assert_eq!(
            codec_args(AudioFormat::Flac, 0),
            vec!["-c:a", "flac", "-compression_level", "12"]
        );
        assert_eq!(
            codec_args(AudioFormat::Mp3, 192),
            vec!["-c:a", "libmp3lame", "-b:a", "192k"]
        );
        assert_eq!(codec_args(AudioFormat::Mp3, 0)[3], "320k");
    }

    #[test]
    fn test_encode_args_order() {
        let metadata = MixMetadata {
            title: Some("Sunrise".to_string()),
            genre: Some("House".to_string()),
            ..Default::default()
        };
        let args = build_encode_args(
            &[PathBuf::from("a.wav"), PathBuf::from("b.wav")],
            "[0:a]anull[out]",
            AudioFormat::Wav,
            0,
            &metadata,
            Path::new("/tmp/mix.wav"),
        );
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-i",
                "a.wav",
                "-i",
                "b.wav",
                "-filter_complex",
                "[0:a]anull[out]",
                "-map",
                "[out]",
                "-c:a",
                "pcm_s16le",
                "-metadata",
                "title=Sunrise",
                "-metadata",
                "genre=House",
                "-y",
                "/tmp/mix.wav",
            ]
        );
    }

    #[test]
    fn test_plan_render_uses_project() {
        let mut project = MixProject::new("Evening");
        project.tracks = vec![
            Track::new(0, "A", "a.wav", 200.0),
            Track::new(1, "B", "b.wav", 180.0),
        ];
        let mix = LoadedMix::from_project("/music", project);
        let settings = ExportDefaults {
            default_crossfade_secs: 4.0,
            ..Default::default()
        };
        let plan = plan_render(&mix, &settings, Path::new("/music/out.flac")).unwrap();

        assert_eq!(plan.total_duration_secs, 376.0);
        assert_eq!(plan.args[2], "/music/a.wav");
        assert_eq!(plan.args[4], "/music/b.wav");
        assert_eq!(plan.args.last().map(String::as_str), Some("/music/out.flac"));
        assert!(plan.args.contains(&"title=Evening".to_string()));
        assert!(plan
            .graph
            .to_filter_complex()
            .ends_with("[a0][a1]acrossfade=d=4.000000:c1=tri:c2=tri[out]"));
    }

    proptest! {
        #[test]
        fn prop_graph_shape(
            fades in prop::collection::vec(0.0f64..10.0, 0..7),
            zero_mask in prop::collection::vec(any::<bool>(), 7),
        ) {
            let n = fades.len() + 1;
            let transitions: Vec<Transition> = fades
                .iter()
                .zip(&zero_mask)
                .map(|(d, zero)| fade(if *zero { 0.0 } else { *d }, CrossfadeCurve::Linear))
                .collect();
            let mix = compile_mix_graph(chains(n), &transitions).unwrap();

            prop_assert_eq!(mix.chains.len(), n);
            prop_assert_eq!(mix.transitions.len(), n - 1);
            prop_assert_eq!(mix.to_filter_graph().validate(n).unwrap(), Pad::new(FINAL_LABEL));
            let finals = mix
                .to_filter_graph()
                .stages
                .iter()
                .filter(|s| s.outputs.contains(&Pad::new(FINAL_LABEL)))
                .count();
            prop_assert_eq!(finals, 1);
        }
    }
}
