//! Numerical gradient check tests: compare autograd with finite difference.

use tensorgrad::expr;
use tensorgrad::{check_gradients, numerical_grad, Shape, Tensor};

const EPS: f32 = 1e-4;

#[test]
fn test_numerical_grad_add() {
    let x = Tensor::from_vec(vec![1.0, 2.0], Shape::new(vec![2]), true).unwrap();
    let loss = || {
        let flat = x.view(Shape::new(vec![1, 2])).unwrap();
        Tensor::from_expr(expr::mean(&flat, 1))
    };
    let g = numerical_grad(&x, loss, EPS);
    assert_eq!(g.len(), 2);
    assert!((g[0] - 0.5).abs() < 1e-2, "g[0] = {} expected ~0.5", g[0]);
    assert!((g[1] - 0.5).abs() < 1e-2, "g[1] = {} expected ~0.5", g[1]);
}

#[test]
fn test_check_gradients_add() {
    let x = Tensor::from_vec(vec![1.0, 2.0], Shape::new(vec![2]), true).unwrap();
    let y = Tensor::from_vec(vec![3.0, 4.0], Shape::new(vec![2]), false).unwrap();
    let loss_fn = || {
        let sum = Tensor::from_expr(expr::add(&x, &y).unwrap());
        let flat = sum.view(Shape::new(vec![1, 2])).unwrap();
        Tensor::from_expr(expr::mean(&flat, 1))
    };
    check_gradients(&x, loss_fn, EPS, 1e-2, 1e-2).unwrap();
}

#[test]
fn test_check_gradients_matmul() {
    let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2]), true).unwrap();
    let c = Tensor::from_vec(vec![0.5, 0.5, 0.5, 0.5], Shape::new(vec![2, 2]), false).unwrap();
    let loss_fn = || {
        let out = Tensor::from_expr(expr::matmul(&a, &c).unwrap());
        let flat = out.view(Shape::new(vec![1, 4])).unwrap();
        Tensor::from_expr(expr::mean(&flat, 1))
    };
    check_gradients(&a, loss_fn, EPS, 1e-2, 1e-2).unwrap();
}

#[test]
fn test_check_gradients_relu() {
    // Avoid exact 0: ReLU'(0) is undefined (subgradient).
    let x = Tensor::from_vec(vec![-1.0, 0.5, 0.01, 2.0], Shape::new(vec![4]), true).unwrap();
    let loss_fn = || {
        let out = Tensor::from_expr(expr::relu(&x));
        let flat = out.view(Shape::new(vec![1, 4])).unwrap();
        Tensor::from_expr(expr::mean(&flat, 1))
    };
    check_gradients(&x, loss_fn, EPS, 1e-2, 1e-2).unwrap();
}
