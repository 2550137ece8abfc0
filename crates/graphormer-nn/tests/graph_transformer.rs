use approx::assert_abs_diff_eq;
use graphormer_autodiff::with_no_grad;
use graphormer_core::{DType, Tensor};
use graphormer_graph::{HeteroGraph, Relation};
use graphormer_nn::{
    AttnBiasType, BiasedAttentionConfig, BiasedMultiheadAttention, DegreeEncoder,
    DegreeEncoderConfig, Direction, Linear, Module, NnError,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

fn example_graph() -> HeteroGraph {
    HeteroGraph::homogeneous(4, &[0, 0, 0, 1, 1, 2, 3, 3], &[1, 2, 3, 0, 3, 0, 0, 1]).unwrap()
}

/// Row-major `x @ W + b` on plain vectors.
fn project(x: &[f64], rows: usize, lin: &Linear) -> Vec<f64> {
    let (fin, fout) = (lin.in_features, lin.out_features);
    let w = lin.weight.data.to_vec::<f64>().unwrap();
    let b = lin
        .bias
        .as_ref()
        .map(|b| b.data.to_vec::<f64>().unwrap())
        .unwrap_or_else(|| vec![0.0; fout]);
    let mut out = vec![0.0; rows * fout];
    for r in 0..rows {
        for o in 0..fout {
            let mut acc = b[o];
            for i in 0..fin {
                acc += x[r * fin + i] * w[i * fout + o];
            }
            out[r * fout + o] = acc;
        }
    }
    out
}

/// Plain scaled dot-product multi-head attention over one `[N, F]` batch item.
fn reference_attention(attn: &BiasedMultiheadAttention, x: &[f64], n: usize) -> Vec<f64> {
    let (f, h, d) = (attn.feat_size, attn.num_heads, attn.head_dim);
    let q = project(x, n, &attn.q_proj);
    let k = project(x, n, &attn.k_proj);
    let v = project(x, n, &attn.v_proj);
    let scale = 1.0 / (d as f64).sqrt();

    let mut merged = vec![0.0; n * f];
    for head in 0..h {
        for i in 0..n {
            let scores: Vec<f64> = (0..n)
                .map(|j| {
                    let dot: f64 =
                        (0..d).map(|c| q[i * f + head * d + c] * k[j * f + head * d + c]).sum();
                    dot * scale
                })
                .collect();
            let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
            let total: f64 = exp.iter().sum();
            for c in 0..d {
                merged[i * f + head * d + c] =
                    (0..n).map(|j| exp[j] / total * v[j * f + head * d + c]).sum();
            }
        }
    }
    project(&merged, n, &attn.out_proj)
}

#[test]
fn test_degree_encoder_on_example_graph() {
    let encoder = DegreeEncoder::new(5, 16, Direction::Both, DType::Float32, &mut rng(0)).unwrap();
    let embedding = encoder.forward(&example_graph()).unwrap();
    assert_eq!(embedding.shape(), &[4, 16]);
    assert_eq!(embedding.dtype(), DType::Float32);
}

#[test]
fn test_both_equals_in_plus_out_with_shared_tables() {
    let g = HeteroGraph::homogeneous(5, &[0, 0, 1, 2, 4], &[1, 2, 2, 3, 0]).unwrap();
    let both = DegreeEncoder::new(3, 4, Direction::Both, DType::Float64, &mut rng(1)).unwrap();
    let mut single_in =
        DegreeEncoder::new(3, 4, Direction::In, DType::Float64, &mut rng(2)).unwrap();
    let mut single_out =
        DegreeEncoder::new(3, 4, Direction::Out, DType::Float64, &mut rng(3)).unwrap();

    let in_weights = both.parameters()[0].data.clone();
    let out_weights = both.parameters()[1].data.clone();
    single_in.parameters_mut()[0].set_data(in_weights).unwrap();
    single_out.parameters_mut()[0].set_data(out_weights).unwrap();

    let sum = (&single_in.forward(&g).unwrap() + &single_out.forward(&g).unwrap()).unwrap();
    let got = both.forward(&g).unwrap();
    for (a, b) in got.to_vec::<f64>().unwrap().iter().zip(sum.to_vec::<f64>().unwrap()) {
        assert_abs_diff_eq!(*a, b, epsilon = 1e-12);
    }
}

#[test]
fn test_degree_zero_embeds_to_zero() {
    // node 3 is isolated
    let g = HeteroGraph::homogeneous(4, &[0, 1], &[1, 2]).unwrap();
    let encoder = DegreeEncoder::from_config(
        &DegreeEncoderConfig::new(4, 8).with_dtype(DType::Float64),
        &mut rng(5),
    )
    .unwrap();
    let out = encoder.forward(&g).unwrap().to_vec::<f64>().unwrap();
    assert!(out[24..].iter().all(|&x| x == 0.0));
}

#[test]
fn test_heterogeneous_graph_matches_its_homogeneous_form() {
    let mut g = HeteroGraph::new(&[("paper", 3), ("author", 2)]).unwrap();
    g.add_edges(&Relation::new("author", "writes", "paper"), &[0, 0, 1], &[0, 1, 2]).unwrap();
    g.add_edges(&Relation::new("paper", "cites", "paper"), &[1, 2], &[0, 0]).unwrap();

    let encoder = DegreeEncoder::new(8, 4, Direction::Both, DType::Float64, &mut rng(4)).unwrap();
    let hetero = encoder.forward(&g).unwrap();
    let homo = encoder.forward(&g.to_homogeneous()).unwrap();
    assert_eq!(hetero.shape(), &[5, 4]);
    assert_eq!(hetero.to_vec::<f64>().unwrap(), homo.to_vec::<f64>().unwrap());
}

#[test]
fn test_padding_row_survives_backward() {
    let g = HeteroGraph::homogeneous(3, &[0], &[1]).unwrap();
    let mut encoder = DegreeEncoder::new(2, 4, Direction::In, DType::Float64, &mut rng(6)).unwrap();
    encoder.backward(&g, &Tensor::ones(&[3, 4], DType::Float64)).unwrap();
    let grad = encoder.parameters()[0].grad().unwrap().to_vec::<f64>().unwrap();
    assert!(grad[..4].iter().all(|&x| x == 0.0));
    assert_eq!(&grad[4..8], &[1.0, 1.0, 1.0, 1.0]);
}

#[test]
fn test_backward_under_no_grad_keeps_buffers_empty() {
    let g = example_graph();
    let mut encoder =
        DegreeEncoder::new(3, 4, Direction::Both, DType::Float64, &mut rng(7)).unwrap();
    let grad = Tensor::ones(&[4, 4], DType::Float64);
    with_no_grad(|| encoder.backward(&g, &grad)).unwrap();
    assert!(encoder.parameters().iter().all(|p| p.grad().is_none()));

    encoder.backward(&g, &grad).unwrap();
    assert!(encoder.parameters().iter().all(|p| p.grad().is_some()));
    encoder.zero_grad();
    assert!(encoder.parameters().iter().all(|p| p.grad().is_none()));
}

#[test]
fn test_unknown_direction_is_rejected() {
    assert!(matches!("diagonal".parse::<Direction>(), Err(NnError::InvalidDirection(_))));
}

#[test]
fn test_indivisible_heads_is_rejected() {
    let err = BiasedMultiheadAttention::new(BiasedAttentionConfig::new(10, 3), &mut rng(0));
    assert!(matches!(err, Err(NnError::IndivisibleHeads { feat_size: 10, num_heads: 3 })));
}

#[test]
fn test_end_to_end_attention_is_deterministic() {
    let config = BiasedAttentionConfig::new(8, 2).with_attn_drop(0.0);
    let attn = BiasedMultiheadAttention::new(config, &mut rng(42)).unwrap();
    let x = Tensor::rand_uniform(&[2, 4, 8], 0.0, 1.0, DType::Float32, &mut rng(1)).unwrap();
    let bias = Tensor::zeros(&[2, 4, 4, 2], DType::Float32);

    let first = attn.forward(&x, Some(&bias), None).unwrap();
    let second = attn.forward(&x, Some(&bias), None).unwrap();
    assert_eq!(first.shape(), &[2, 4, 8]);
    assert_eq!(first.dtype(), DType::Float32);
    assert!(first.all_finite());
    assert_eq!(first.to_vec::<f32>().unwrap(), second.to_vec::<f32>().unwrap());
}

#[test]
fn test_unbiased_attention_matches_reference() {
    let config = BiasedAttentionConfig::new(6, 3).with_dtype(DType::Float64);
    let mut attn = BiasedMultiheadAttention::new(config, &mut rng(11)).unwrap();
    // non-zero biases so the reference covers them too
    for (i, p) in attn.parameters_mut().into_iter().enumerate() {
        if p.shape().len() == 1 {
            let mut bias_rng = rng(100 + i as u64);
            let b = Tensor::rand_uniform(&[6], -0.5, 0.5, DType::Float64, &mut bias_rng).unwrap();
            p.set_data(b).unwrap();
        }
    }

    let (bsz, n, f) = (2, 5, 6);
    let x = Tensor::randn(&[bsz, n, f], DType::Float64, &mut rng(12)).unwrap();
    let out = attn.forward(&x, None, None).unwrap().to_vec::<f64>().unwrap();

    let flat = x.to_vec::<f64>().unwrap();
    for b in 0..bsz {
        let item = &flat[b * n * f..(b + 1) * n * f];
        let expected = reference_attention(&attn, item, n);
        for (got, want) in out[b * n * f..(b + 1) * n * f].iter().zip(expected) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-10);
        }
    }
}

#[test]
fn test_mask_applies_to_every_head() {
    let config = BiasedAttentionConfig::new(8, 4).with_dtype(DType::Float64);
    let attn = BiasedMultiheadAttention::new(config, &mut rng(3)).unwrap();
    let x = Tensor::randn(&[1, 3, 8], DType::Float64, &mut rng(4)).unwrap();
    // query 0 may not see key 1
    let mask = Tensor::from_vec(vec![0i64, 1, 0, 0, 0, 0, 0, 0, 0], &[1, 3, 3]).unwrap();
    let (_, probs) = attn.forward_with_weights(&x, None, Some(&mask), &mut rng(0)).unwrap();
    let p = probs.to_vec::<f64>().unwrap();
    for head in 0..4 {
        assert_eq!(p[head * 9 + 1], 0.0);
        assert!(p[head * 9 + 3 + 1] > 0.0);
    }
}

/// Split `[B, H, N, N]` probabilities into `((b, h, i), row over keys)` lanes.
fn lanes(probs: &Tensor) -> Vec<((usize, usize, usize), Vec<f64>)> {
    let shape = probs.shape().to_vec();
    let (heads, n) = (shape[1], shape[2]);
    probs
        .to_vec::<f64>()
        .unwrap()
        .chunks(n)
        .enumerate()
        .map(|(lane, p)| {
            let (b, rest) = (lane / (heads * n), lane % (heads * n));
            ((b, rest / n, rest % n), p.to_vec())
        })
        .collect()
}

#[test]
fn test_bias_entry_lands_on_its_batch_query_key_and_head() {
    let (bsz, n, heads) = (2, 3, 2);
    let config = BiasedAttentionConfig::new(8, heads).with_dtype(DType::Float64);
    let add = BiasedMultiheadAttention::new(config.clone(), &mut rng(21)).unwrap();
    let mul = BiasedMultiheadAttention::new(
        config.with_attn_bias_type(AttnBiasType::Mul),
        &mut rng(21),
    )
    .unwrap();
    let x = Tensor::randn(&[bsz, n, 8], DType::Float64, &mut rng(22)).unwrap();
    let (_, plain) = add.forward_with_weights(&x, None, None, &mut rng(0)).unwrap();

    let (b, i, j, h) = (1, 0, 2, 1);
    let target = ((b * n + i) * n + j) * heads + h;
    let mut spike = vec![0.0; bsz * n * n * heads];
    spike[target] = 100.0;
    let spike = Tensor::from_vec(spike, &[bsz, n, n, heads]).unwrap();
    let (_, biased) = add.forward_with_weights(&x, Some(&spike), None, &mut rng(0)).unwrap();

    for ((lane, p), (_, q)) in lanes(&biased).into_iter().zip(lanes(&plain)) {
        if lane == (b, h, i) {
            assert_abs_diff_eq!(p[j], 1.0, epsilon = 1e-9);
            assert!(p[0] < 1e-9 && p[1] < 1e-9);
        } else {
            assert_eq!(p, q, "lane {:?} should be untouched", lane);
        }
    }

    // a single zero in an all-ones multiplicative bias only moves the same lane
    let mut hole = vec![1.0; bsz * n * n * heads];
    hole[target] = 0.0;
    let hole = Tensor::from_vec(hole, &[bsz, n, n, heads]).unwrap();
    let (_, scaled) = mul.forward_with_weights(&x, Some(&hole), None, &mut rng(0)).unwrap();
    for ((lane, p), (_, q)) in lanes(&scaled).into_iter().zip(lanes(&plain)) {
        if lane == (b, h, i) {
            assert!(p.iter().zip(&q).any(|(x, y)| (x - y).abs() > 1e-9));
        } else {
            for (x, y) in p.iter().zip(&q) {
                assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn test_multiplicative_bias_of_ones_is_identity() {
    let base = BiasedAttentionConfig::new(8, 2).with_dtype(DType::Float64);
    let add = BiasedMultiheadAttention::new(base.clone(), &mut rng(8)).unwrap();
    let mul_config = base.with_attn_bias_type(AttnBiasType::Mul);
    let mul = BiasedMultiheadAttention::new(mul_config, &mut rng(8)).unwrap();
    let x = Tensor::randn(&[1, 4, 8], DType::Float64, &mut rng(9)).unwrap();
    let ones = Tensor::ones(&[1, 4, 4, 2], DType::Float64);

    let plain = add.forward(&x, None, None).unwrap().to_vec::<f64>().unwrap();
    let scaled = mul.forward(&x, Some(&ones), None).unwrap().to_vec::<f64>().unwrap();
    for (a, b) in plain.iter().zip(&scaled) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }
}

#[test]
fn test_save_and_load_reproduce_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attention.bin");

    let config = BiasedAttentionConfig::new(8, 2).with_dtype(DType::Float64);
    let trained = BiasedMultiheadAttention::new(config.clone(), &mut rng(1)).unwrap();
    trained.save(&path).unwrap();

    let mut restored = BiasedMultiheadAttention::new(config, &mut rng(2)).unwrap();
    let x = Tensor::randn(&[1, 3, 8], DType::Float64, &mut rng(3)).unwrap();
    assert_ne!(
        trained.forward(&x, None, None).unwrap().to_vec::<f64>().unwrap(),
        restored.forward(&x, None, None).unwrap().to_vec::<f64>().unwrap()
    );
    restored.load(&path).unwrap();
    assert_eq!(
        trained.forward(&x, None, None).unwrap().to_vec::<f64>().unwrap(),
        restored.forward(&x, None, None).unwrap().to_vec::<f64>().unwrap()
    );

    let encoder_path = dir.path().join("degree.bin");
    let encoder = DegreeEncoder::new(4, 8, Direction::Both, DType::Float64, &mut rng(5)).unwrap();
    encoder.save(&encoder_path).unwrap();
    let mut copy = DegreeEncoder::new(4, 8, Direction::Both, DType::Float64, &mut rng(6)).unwrap();
    copy.load(&encoder_path).unwrap();
    let g = example_graph();
    assert_eq!(
        encoder.forward(&g).unwrap().to_vec::<f64>().unwrap(),
        copy.forward(&g).unwrap().to_vec::<f64>().unwrap()
    );
}

#[test]
fn test_load_rejects_mismatched_architecture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("degree.bin");
    DegreeEncoder::new(4, 8, Direction::In, DType::Float64, &mut rng(0))
        .unwrap()
        .save(&path)
        .unwrap();

    let mut both = DegreeEncoder::new(4, 8, Direction::Both, DType::Float64, &mut rng(0)).unwrap();
    assert!(matches!(both.load(&path), Err(NnError::InvalidConfig(_))));

    let mut wider = DegreeEncoder::new(4, 16, Direction::In, DType::Float64, &mut rng(0)).unwrap();
    assert!(wider.load(&path).is_err());
}
