//! Regression tests pinned to exact literal values for the two trickiest
//! gradient-routing paths: im2col padding and momentum's running mean.

use tensorgrad::expr::{self, Img2ColParams};
use tensorgrad::optimizer::{Optimizer, SGDwithMomentum};
use tensorgrad::{Linear, Shape, Tensor};

#[test]
fn img2col_padding_grad_matches_literal_grid() {
    let x = Tensor::zeros(Shape::new(vec![1, 1, 6, 4]), true);
    let col = Tensor::from_expr(
        expr::img2col(&x, Img2ColParams { kernel: (4, 4), stride: (2, 2), padding: (1, 1) }).unwrap(),
    );
    assert_eq!(col.shape().dims(), &[6, 16]);

    let seed = Tensor::from_vec(vec![1.0; 6 * 16], Shape::new(vec![6, 16]), false).unwrap();
    col.backward_from(&seed).unwrap();

    #[rustfmt::skip]
    let expected: [f32; 24] = [
        5.0,  8.0,  8.0,  5.0,
        8.0, 13.0, 13.0,  8.0,
        8.0, 13.0, 13.0,  8.0,
        8.0, 13.0, 13.0,  8.0,
        8.0, 13.0, 13.0,  8.0,
        5.0,  8.0,  8.0,  5.0,
    ];
    let grad = x.grad().unwrap().to_vec();
    for (got, want) in grad.iter().zip(expected.iter()) {
        assert!((got - want).abs() < 1e-5, "grad {:?} != expected {:?}", grad, expected);
    }
}

#[test]
fn sgd_with_momentum_matches_literal_two_step_update() {
    // Weight/bias literals, in the [in_features, out_features] layout this
    // engine's Linear uses (transposed from a row-per-output-unit layout).
    #[rustfmt::skip]
    let weight: [f32; 12] = [
        0.5437, -0.3073, -0.0405, 0.4171,
       -0.4394,  0.4709,  0.5013, -0.2727,
       -0.0307,  0.1285, -0.3253, -0.3348,
    ];
    let bias: [f32; 4] = [0.1618, -0.4150, 0.1099, 0.2695];

    let mut model = Linear::new(3, 4);
    model.weight.data().load_data(&weight).unwrap();
    model.bias.data().load_data(&bias).unwrap();

    let input = Tensor::from_vec(vec![0.4746, 0.5383, 0.2668, 0.0405, 0.8955, 0.7365], Shape::new(vec![2, 3]), false).unwrap();

    let mut opt = SGDwithMomentum::new(0.01, 0.9);

    let run_step = |model: &mut Linear, opt: &mut SGDwithMomentum| {
        let out = Tensor::from_expr(expr::matmul(&input, model.weight.data()).unwrap());
        let out = Tensor::from_expr(expr::add(&out, model.bias.data()).unwrap());
        model.weight.data().zero_grad();
        model.bias.data().zero_grad();
        let seed = Tensor::from_vec(vec![1.0; 8], Shape::new(vec![2, 4]), false).unwrap();
        out.backward_from(&seed).unwrap();
        let mut params = vec![&mut model.weight, &mut model.bias];
        opt.step(&mut params).unwrap();
    };

    run_step(&mut model, &mut opt);
    let bias_after_1 = model.bias.data().to_vec();
    // First momentum step: running mean is the raw gradient, so this matches
    // a plain SGD step with the same gradient.
    #[rustfmt::skip]
    let expected_bias_1 = [0.1418, -0.4350, 0.0899, 0.2495];
    for (got, want) in bias_after_1.iter().zip(expected_bias_1.iter()) {
        assert!((got - want).abs() < 1e-3, "bias after step 1: {:?} != {:?}", bias_after_1, expected_bias_1);
    }

    run_step(&mut model, &mut opt);
    let bias_after_2 = model.bias.data().to_vec();
    // The gradient of sum(output) w.r.t. this layer's own bias is the
    // column-sum of the seed, independent of the layer's parameters; with a
    // fixed input and seed it is identical (2.0 per entry) on both steps.
    // Under the corrected `m <- momentum*m + (1-momentum)*grad` update, that
    // makes the running mean equal to that same constant gradient on step 2
    // too, so step 2 moves the bias by exactly the same -0.02 delta as step
    // 1 (not the 1.9x-larger delta the uncorrected formula would produce).
    #[rustfmt::skip]
    let expected_bias_2 = [0.1218, -0.4550, 0.0699, 0.2295];
    for (got, want) in bias_after_2.iter().zip(expected_bias_2.iter()) {
        assert!((got - want).abs() < 1e-3, "bias after step 2: {:?} != {:?}", bias_after_2, expected_bias_2);
    }
}
