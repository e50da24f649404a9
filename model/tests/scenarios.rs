use approx::assert_relative_eq;
use chrono::{Duration, TimeZone, Utc};
use geo::{coord, Rect};

use flight_model::{
    Column, FillMethod, How, Interpolation, LabelValue, PlanarProjection, ProjectionKind,
    ResampleOptions, Segments, Time, Trajectory, Value,
};

fn noon(secs: i64) -> Time {
    Utc.with_ymd_and_hms(2018, 5, 30, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

fn at_rest(secs: &[i64]) -> Trajectory {
    let points: Vec<(Time, f64, f64)> = secs.iter().map(|s| (noon(*s), 43.6, 1.4)).collect();
    Trajectory::from_points(&points).unwrap()
}

fn with(f: Trajectory, name: &str, values: &[f64]) -> Trajectory {
    f.assign(name, Column::floats(values.to_vec())).unwrap()
}

fn floats(f: &Trajectory, name: &str) -> Vec<Option<f64>> {
    f.floats(name).unwrap()
}

#[test]
fn split_on_ten_minute_gap() {
    let f = at_rest(&[0, 1, 2, 10 * 60 + 3, 10 * 60 + 4]);
    let segments = f.split("10 min".parse::<flight_model::Gap>().unwrap());
    let sizes: Vec<usize> = segments.iter().map(|s| s.data().len()).collect();
    assert_eq!(sizes, vec![3, 2]);

    // Nothing lost or duplicated
    let all = segments.all(None).unwrap().unwrap();
    assert_eq!(all.times(), f.times());
    assert_eq!(all.interval(), f.interval());
}

#[test]
fn label_covered_rows() {
    let f = at_rest(&(0..10).collect::<Vec<_>>());
    let pieces = vec![
        f.slice_between(noon(0), noon(2), false).unwrap(),
        f.slice_between(noon(5), noon(7), false).unwrap(),
    ];
    let labelled = Segments::from_vec("pieces", pieces)
        .label(&f, &[("tag", true.into()), ("which", LabelValue::Template("{i}".into()))])
        .unwrap();
    let tags: Vec<Value> = (0..10).map(|row| labelled.data().get(row, "tag")).collect();
    let expected: Vec<Value> = [true, true, true, false, false, true, true, true, false, false]
        .into_iter()
        .map(Value::Bool)
        .collect();
    assert_eq!(tags, expected);
    assert_eq!(labelled.data().get(3, "which"), Value::Null);
    assert_eq!(labelled.data().get(6, "which"), Value::Text("1".to_string()));
}

#[test]
fn subtraction_leaves_two_pieces() {
    let f = at_rest(&(0..=60).map(|m| m * 60).collect::<Vec<_>>());
    let s = f.slice_between(noon(20 * 60), noon(30 * 60), false).unwrap();
    let rest: Vec<(Time, Time)> = (&f - &s).iter().map(|p| (p.start(), p.stop())).collect();
    assert_eq!(
        rest,
        vec![(noon(0), noon(20 * 60)), (noon(30 * 60), noon(60 * 60))]
    );
    assert!(!(&f - &f).has());

    let overlap = (&f & &s).unwrap();
    assert_eq!(overlap.interval(), s.interval());
}

#[test]
fn slice_strictness() {
    let f = at_rest(&[0, 5, 10]);
    assert_eq!(f.slice_between(noon(0), noon(10), true).unwrap().times(), &[noon(5)]);
    assert_eq!(f.slice_between(noon(0), noon(10), false).unwrap().data().len(), 3);
}

#[test]
fn resample_regular_data_is_unchanged() {
    let secs: Vec<i64> = (0..20).collect();
    let altitudes: Vec<f64> = secs.iter().map(|s| 1000.0 + 10.0 * *s as f64).collect();
    let f = with(at_rest(&secs), "altitude", &altitudes);
    let resampled = f.resample(Duration::seconds(1)).unwrap();
    assert_eq!(resampled, f);
}

#[test]
fn resample_count_cardinality() {
    let f = at_rest(&[0, 1, 7, 30, 31, 95]);
    for n in [2usize, 3, 10, 100, 1000] {
        assert_eq!(f.resample(n).unwrap().data().len(), n);
    }
    assert!(f.resample(0usize).is_err());
}

fn how_input() -> Trajectory {
    let f = with(at_rest(&[0, 5, 10]), "altitude", &[30000.0, 25000.0, 27000.0]);
    f.assign("fake", Column::Int(vec![Some(0), Some(5), Some(10)])).unwrap()
}

fn resample_how(how: How, interpolation: Interpolation) -> Trajectory {
    let options = ResampleOptions {
        how,
        interpolation,
        ..ResampleOptions::new(Duration::seconds(1))
    };
    how_input().resample_with(&options).unwrap()
}

fn some(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().map(|x| Some(*x)).collect()
}

#[test]
fn resample_how_interpolate() {
    let f = resample_how(How::Default, Interpolation::Linear);
    assert_eq!(
        floats(&f, "altitude"),
        some(&[
            30000.0, 29000.0, 28000.0, 27000.0, 26000.0, 25000.0, 25400.0, 25800.0, 26200.0,
            26600.0, 27000.0
        ])
    );
    assert_eq!(
        floats(&f, "fake"),
        some(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0])
    );
}

#[test]
fn resample_how_ffill() {
    let f = resample_how(How::All(FillMethod::Ffill), Interpolation::Linear);
    let mut expected = vec![30000.0; 5];
    expected.extend([25000.0; 5]);
    expected.push(27000.0);
    assert_eq!(floats(&f, "altitude"), some(&expected));
    let mut expected = vec![0.0; 5];
    expected.extend([5.0; 5]);
    expected.push(10.0);
    assert_eq!(floats(&f, "fake"), some(&expected));
}

#[test]
fn resample_how_quadratic() {
    let f = resample_how(How::Default, Interpolation::Polynomial(2));
    let expected = [
        30000.0, 28440.0, 27160.0, 26160.0, 25440.0, 25000.0, 24840.0, 24960.0, 25360.0,
        26040.0, 27000.0,
    ];
    for (got, want) in floats(&f, "altitude").into_iter().zip(expected) {
        assert_relative_eq!(got.unwrap(), want, epsilon = 1e-6);
    }
}

#[test]
fn resample_how_only_some_columns() {
    let how = How::Columns(vec![(FillMethod::Ffill, vec!["altitude".to_string()])]);
    let f = resample_how(how, Interpolation::Linear);
    assert_eq!(floats(&f, "altitude")[4], Some(30000.0));
    let mut expected = vec![None; 11];
    expected[0] = Some(0.0);
    expected[5] = Some(5.0);
    expected[10] = Some(10.0);
    assert_eq!(floats(&f, "fake"), expected);
}

#[test]
fn resample_unwrapped_track() {
    let f = with(at_rest(&[0, 30, 60, 90]), "track", &[345.0, 355.0, 5.0, 15.0]);
    let resampled = f.resample(Duration::seconds(1)).unwrap();
    assert_eq!(resampled.data().len(), 91);
    for track in floats(&resampled, "track").into_iter().flatten() {
        assert!(!(50.0..300.0).contains(&track), "{track}");
    }
    assert_eq!(f.resample(10usize).unwrap().data().len(), 10);
}

#[test]
fn resample_in_a_projection() {
    let jfk_cdg = Trajectory::from_points(&[
        (
            Utc.with_ymd_and_hms(2018, 5, 30, 4, 9, 29).unwrap(),
            40.64,
            -73.81,
        ),
        (
            Utc.with_ymd_and_hms(2018, 5, 30, 10, 9, 46).unwrap(),
            49.0,
            2.81,
        ),
    ])
    .unwrap();
    let rule = Duration::minutes(1);
    let plain = jfk_cdg.resample(rule).unwrap();
    let options = ResampleOptions {
        projection: Some(PlanarProjection::Centered(ProjectionKind::Lcc)),
        ..ResampleOptions::new(rule)
    };
    let projected = jfk_cdg.resample_with(&options).unwrap();
    assert_eq!(projected.data().len(), plain.data().len());
    // The planar coordinates stay around
    assert!(projected.has("x"));

    let flown = |f: &Trajectory| {
        let with = f.cumulative_distance(false, false, false).unwrap();
        floats(&with, "cumdist").last().cloned().flatten().unwrap()
    };
    assert!(flown(&projected) < flown(&plain));
}

#[test]
fn clip_containment() {
    let points: Vec<(Time, f64, f64)> = (0..5)
        .map(|i| (noon(60 * i), 43.0 + 0.1 * i as f64, 1.0 + 0.1 * i as f64))
        .collect();
    let f = Trajectory::from_points(&points).unwrap();
    let everything = Rect::new(coord! { x: 0.0, y: 42.0 }, coord! { x: 2.0, y: 44.0 });
    assert_eq!(f.clip(&everything).unwrap(), Some(f.clone()));
    let elsewhere = Rect::new(coord! { x: 10.0, y: 42.0 }, coord! { x: 12.0, y: 44.0 });
    assert_eq!(f.clip(&elsewhere).unwrap(), None);
    assert_eq!(f.clip_iterate(&elsewhere).unwrap().count(), 0);
}
