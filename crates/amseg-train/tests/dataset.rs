use std::path::Path;

use amseg_train::{
    load_dataset, resize_cyclic, DatasetConfig, DatasetError, DatasetIndex, SegmentationDataset,
    TransformPreset,
};
use burn::data::dataset::Dataset;
use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::{rngs::StdRng, SeedableRng};

fn write_image(path: &Path, width: u32, height: u32) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7) as u8, (y * 11) as u8, 90]))
        .save(path)
        .unwrap();
}

fn write_mask(path: &Path, width: u32, height: u32) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    GrayImage::from_fn(width, height, |x, y| Luma([if x > y { 255 } else { 0 }]))
        .save(path)
        .unwrap();
}

/// `g1` holds `a.png` (with mask) and `b.png` (without).
fn single_group_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let g1 = dir.path().join("g1");
    write_image(&g1.join("source/a.png"), 6, 4);
    write_image(&g1.join("source/b.png"), 5, 7);
    write_mask(&g1.join("mask/a.png"), 6, 4);
    dir
}

fn multi_group_root() -> tempfile::TempDir {
    let dir = single_group_root();
    let g2 = dir.path().join("g2");
    write_image(&g2.join("source/c.png"), 3, 3);
    write_mask(&g2.join("mask/c.png"), 3, 3);
    let g3 = dir.path().join("g3");
    write_image(&g3.join("source/d.png"), 4, 2);
    dir
}

fn spatial(shape: &[usize]) -> (usize, usize) {
    (shape[1], shape[2])
}

#[test]
fn single_group_example_end_to_end() {
    let dir = single_group_root();

    let index = DatasetIndex::build(dir.path()).unwrap();
    assert_eq!(index.images().len(), 2);
    assert_eq!(index.masks().len(), 2);

    let dataset = SegmentationDataset::from_index(index, None).unwrap();

    let b = dataset.try_get(1).unwrap();
    assert_eq!(b.mask.shape, vec![1, 7, 5]);
    assert_eq!(spatial(&b.image.shape), (7, 5));
    assert!(b.mask.to_vec::<f32>().unwrap().iter().all(|v| *v == 0.0));

    let a = dataset.try_get(0).unwrap();
    let expected: Vec<f32> = (0..4u32)
        .flat_map(|y| (0..6u32).map(move |x| if x > y { 255.0 } else { 0.0 }))
        .collect();
    assert_eq!(a.mask.shape, vec![1, 4, 6]);
    assert_eq!(a.mask.to_vec::<f32>().unwrap(), expected);
}

#[test]
fn every_sample_has_matching_image_and_mask_size() {
    let dir = multi_group_root();

    for preset in [TransformPreset::Eval, TransformPreset::Train] {
        let dataset = load_dataset::<_, &str>(dir.path(), preset, &[], None, 3).unwrap();
        assert_eq!(dataset.len(), 4);

        for i in 0..dataset.len() {
            let item = dataset.get(i).unwrap();
            assert_eq!(item.image.shape[0], 3);
            assert_eq!(item.mask.shape[0], 1);
            assert_eq!(spatial(&item.image.shape), spatial(&item.mask.shape));
        }
    }
}

#[test]
fn group_filter_keeps_only_selected_groups_in_order() {
    let dir = multi_group_root();
    let full = DatasetIndex::build(dir.path()).unwrap();

    let filtered = full.filter_groups(&["g3", "g1"]);

    assert_eq!(filtered.groups(), vec!["g1", "g3"]);
    let expected: Vec<_> = full
        .images()
        .iter()
        .filter(|e| e.group != "g2")
        .cloned()
        .collect();
    assert_eq!(filtered.images(), expected.as_slice());
    assert!(filtered.masks().iter().all(|e| e.group != "g2"));
}

#[test]
fn load_dataset_replicates_to_size() {
    let dir = multi_group_root();
    let index = DatasetIndex::build(dir.path()).unwrap();

    let dataset =
        load_dataset(dir.path(), TransformPreset::Eval, &["g1", "g2"], Some(7), 0).unwrap();

    let base: Vec<_> = index.filter_groups(&["g1", "g2"]).images().to_vec();
    assert_eq!(dataset.len(), 7);
    for (j, entry) in dataset.image_entries().iter().enumerate() {
        assert_eq!(*entry, base[j % base.len()]);
    }
}

#[test]
fn load_dataset_truncates_to_size() {
    let dir = multi_group_root();
    let index = DatasetIndex::build(dir.path()).unwrap();

    let dataset =
        load_dataset::<_, &str>(dir.path(), TransformPreset::Eval, &[], Some(2), 0).unwrap();

    assert_eq!(dataset.image_entries(), index.images()[..2].to_vec());
    assert_eq!(dataset.mask_entries(), index.masks()[..2].to_vec());
}

#[test]
fn replication_of_empty_selection_fails() {
    let dir = multi_group_root();

    let result = load_dataset(dir.path(), TransformPreset::Eval, &["nope"], Some(3), 0);

    assert!(matches!(result, Err(DatasetError::EmptyIndex { size: 3 })));
}

#[test]
fn resize_cyclic_row_j_is_row_j_mod_n() {
    let rows: Vec<usize> = (0..5).collect();

    for target in [1, 5, 6, 11, 23] {
        let out = resize_cyclic(&rows, target).unwrap();
        assert_eq!(out.len(), target);
        assert!(out.iter().enumerate().all(|(j, v)| *v == j % rows.len()));
    }
}

#[test]
fn combine_concatenates_rows() {
    let dir = multi_group_root();
    let a = load_dataset(dir.path(), TransformPreset::Train, &["g1"], None, 0).unwrap();
    let b = load_dataset(dir.path(), TransformPreset::Eval, &["g2", "g3"], None, 0).unwrap();

    let combined = a.combine(&b);

    assert_eq!(combined.len(), a.len() + b.len());
    assert_eq!(&combined.entries()[..a.len()], a.entries());
    assert_eq!(&combined.entries()[a.len()..], b.entries());
}

#[test]
fn seeded_access_is_reproducible() {
    let dir = single_group_root();
    let dataset =
        load_dataset::<_, &str>(dir.path(), TransformPreset::Train, &[], None, 11).unwrap();

    let first = dataset.get_with_rng(0, &mut StdRng::seed_from_u64(5)).unwrap();
    let second = dataset.get_with_rng(0, &mut StdRng::seed_from_u64(5)).unwrap();
    assert_eq!(first.image.to_vec::<f32>().unwrap(), second.image.to_vec::<f32>().unwrap());
    assert_eq!(first.mask.to_vec::<f32>().unwrap(), second.mask.to_vec::<f32>().unwrap());

    let replay = dataset.clone();
    let a = dataset.try_get(0).unwrap();
    let b = replay.try_get(0).unwrap();
    assert_eq!(a.image.to_vec::<f32>().unwrap(), b.image.to_vec::<f32>().unwrap());
}

#[test]
fn config_assembles_same_rows_as_load_dataset() {
    let dir = multi_group_root();
    let config = DatasetConfig::new(dir.path().to_path_buf())
        .with_groups(Some(vec!["g2".to_owned()]))
        .with_size(Some(3));

    let dataset = config.load_dataset().unwrap();

    assert_eq!(dataset.len(), 3);
    assert!(dataset.entries().iter().all(|e| e.group == "g2"));
}

#[test]
fn out_of_range_get_is_none() {
    let dir = single_group_root();
    let dataset =
        load_dataset::<_, &str>(dir.path(), TransformPreset::Eval, &[], None, 0).unwrap();

    assert!(dataset.get(2).is_none());
    assert!(matches!(
        dataset.try_get(2),
        Err(DatasetError::IndexOutOfRange { index: 2, len: 2 })
    ));
}
